use crate::audio::track::Track;

/// Aviso que el coordinador emite hacia la capa del bot
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub guild_id: u64,
    pub kind: PlayerEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEventKind {
    TrackStarted(Track),
    /// El track no se pudo abrir y se quitó de la cola
    TrackSkippedDueToError { track: Track, reason: String },
    QueueFinished,
}

impl PlayerEvent {
    /// Texto listo para enviar al canal
    pub fn describe(&self) -> String {
        match &self.kind {
            PlayerEventKind::TrackStarted(track) => format!(
                "🎵 Reproduciendo: **{}** [{}]",
                track.display_title(),
                track.duration_formatted()
            ),
            PlayerEventKind::TrackSkippedDueToError { track, reason } => format!(
                "⚠️ No se pudo reproducir **{}**, se salta: {}",
                track.display_title(),
                reason
            ),
            PlayerEventKind::QueueFinished => "📭 La cola terminó".to_string(),
        }
    }
}
