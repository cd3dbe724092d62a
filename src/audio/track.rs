use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Origen de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Video individual de un sitio de video (se extrae con yt-dlp)
    VideoHost,
    /// Entrada de una playlist externa (también pasa por yt-dlp)
    ExternalPlaylist,
    /// Archivo local o URL de audio directa
    Local,
}

impl SourceKind {
    /// Indica si el stream necesita pasar por el extractor antes de FFmpeg
    pub fn needs_extraction(self) -> bool {
        matches!(self, SourceKind::VideoHost | SourceKind::ExternalPlaylist)
    }
}

/// Un elemento reproducible. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    title: String,
    stream_ref: String,
    duration_secs: u64,
    thumbnail: Option<String>,
    artist: Option<String>,
    requester_id: u64,
    source_kind: SourceKind,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        stream_ref: impl Into<String>,
        source_kind: SourceKind,
        requester_id: u64,
    ) -> Self {
        Self {
            title: title.into(),
            stream_ref: stream_ref.into(),
            duration_secs: 0,
            thumbnail: None,
            artist: None,
            requester_id,
            source_kind,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn stream_ref(&self) -> &str {
        &self.stream_ref
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn requester_id(&self) -> u64 {
        self.requester_id
    }
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// "Artista - Título" cuando se conoce el artista
    pub fn display_title(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }

    /// Duración como `mm:ss` o `hh:mm:ss`
    pub fn duration_formatted(&self) -> String {
        format_duration(self.duration_secs)
    }
}

pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
