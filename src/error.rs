use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Todos se devuelven como valores desde la API pública de [`GuildPlayer`]
/// y su `Display` es un texto listo para mostrar al usuario.
///
/// [`GuildPlayer`]: crate::audio::player::GuildPlayer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    /// Valor fuera de rango o nombre desconocido (volumen, filtro, preset...)
    #[error("{0}")]
    Validation(String),

    #[error("La cola está llena (máximo {max} canciones)")]
    CapacityExceeded { max: usize },

    /// Fallo del adaptador de audio o del resolvedor de streams
    #[error("Error del backend de audio: {0}")]
    Adapter(String),

    #[error("No se pudo iniciar la reproducción: {0}")]
    PlaybackFailure(String),

    #[error("Otro cambio de reproducción sigue en curso, inténtalo de nuevo")]
    ConcurrencyConflict,
}

impl PlayerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn adapter(reason: impl std::fmt::Display) -> Self {
        Self::Adapter(reason.to_string())
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
