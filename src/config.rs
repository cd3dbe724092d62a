use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::player::{PlayerSettings, MAX_VOLUME, MIN_VOLUME};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub restart_settle_ms: u64,
    pub lock_timeout_ms: u64,

    // Herramientas externas
    pub ffmpeg_path: PathBuf,
    pub ytdlp_path: PathBuf,
    pub search_results: usize,

    // Paths
    pub data_dir: PathBuf,
    pub music_dir: Option<PathBuf>, // Archivos locales permitidos; None los desactiva
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            restart_settle_ms: std::env::var("RESTART_SETTLE_MS")
                .unwrap_or_else(|_| "150".to_string())
                .parse()?,
            lock_timeout_ms: std::env::var("LOCK_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()?,

            // Herramientas externas
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .unwrap_or_else(|_| "ffmpeg".to_string())
                .into(),
            ytdlp_path: std::env::var("YTDLP_PATH")
                .unwrap_or_else(|_| "yt-dlp".to_string())
                .into(),
            search_results: std::env::var("SEARCH_RESULTS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            music_dir: std::env::var("MUSIC_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración.
    ///
    /// - El volumen por defecto debe estar entre 0.0 y 2.0
    /// - Los tamaños de cola y playlist deben ser mayores que 0
    /// - El timeout de espera por guild debe ser mayor que 0
    pub fn validate(&self) -> Result<()> {
        if !(MIN_VOLUME..=MAX_VOLUME).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between {} and {}, got: {}",
                MIN_VOLUME,
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.lock_timeout_ms == 0 {
            anyhow::bail!("Lock timeout must be greater than 0");
        }

        if self.search_results == 0 {
            anyhow::bail!("Search results must be greater than 0");
        }

        Ok(())
    }

    /// Parte de la configuración que necesita el reproductor
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            max_queue_size: self.max_queue_size,
            default_volume: self.default_volume,
            restart_settle: Duration::from_millis(self.restart_settle_ms),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    /// Resumen para logs, sin el token
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, cola {}, playlist {}\n  \
            Reinicio: {}ms settle, {}ms timeout\n  \
            Tools: ffmpeg={}, yt-dlp={}\n  \
            Data: {} (música local: {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_playlist_size,
            self.restart_settle_ms,
            self.lock_timeout_ms,
            self.ffmpeg_path.display(),
            self.ytdlp_path.display(),
            self.data_dir.display(),
            self.music_dir
                .as_ref()
                .map_or("desactivada".to_string(), |dir| dir.display().to_string())
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto, hay que configurarlos)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 1.0,
            max_queue_size: 100,
            max_playlist_size: 50,
            restart_settle_ms: 150,
            lock_timeout_ms: 15_000,

            ffmpeg_path: "ffmpeg".into(),
            ytdlp_path: "yt-dlp".into(),
            search_results: 1,

            data_dir: "./data".into(),
            music_dir: None,
        }
    }
}
