pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"];

/// Convierte lo que escribe el usuario en tracks reproducibles
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requester_id: u64) -> Result<Vec<Track>>;
}

/// Qué tipo de consulta escribió el usuario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Texto libre, se busca
    Search(String),
    /// Video individual
    Video(String),
    /// Playlist o set de un sitio soportado por yt-dlp
    Playlist(String),
    /// URL de audio directa, va directo a FFmpeg
    Direct(String),
    /// Archivo del host; solo se acepta dentro de la carpeta de música
    Local(PathBuf),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();
        let lower = query.to_lowercase();

        if let Ok(url) = url::Url::parse(query) {
            if matches!(url.scheme(), "http" | "https") {
                if AUDIO_EXTENSIONS.iter().any(|ext| url.path().to_lowercase().ends_with(ext)) {
                    return Self::Direct(query.to_string());
                }
                let is_playlist = url.path().contains("/playlist")
                    || url.path().contains("/sets/")
                    || url.query_pairs().any(|(key, _)| key == "list");
                return if is_playlist {
                    Self::Playlist(query.to_string())
                } else {
                    Self::Video(query.to_string())
                };
            }
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .unwrap_or_else(|_| PathBuf::from(url.path()));
                return Self::Local(path);
            }
        }

        if query.starts_with('/') && AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Self::Local(PathBuf::from(query));
        }

        Self::Search(query.to_string())
    }
}

pub fn has_audio_extension(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Título legible para un archivo o URL directa
pub fn title_from_path(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .and_then(|name| name.split('?').next())
        .map(|name| match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name.to_string(),
        })
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_queries() {
        assert_eq!(
            QueryKind::classify("daft punk around the world"),
            QueryKind::Search("daft punk around the world".into())
        );
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=abc"),
            QueryKind::Video("https://www.youtube.com/watch?v=abc".into())
        );
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=abc&list=PL1"),
            QueryKind::Playlist("https://www.youtube.com/watch?v=abc&list=PL1".into())
        );
        assert_eq!(
            QueryKind::classify("https://soundcloud.com/artist/sets/mix"),
            QueryKind::Playlist("https://soundcloud.com/artist/sets/mix".into())
        );
        assert_eq!(
            QueryKind::classify("https://cdn.example.com/audio/Song.MP3"),
            QueryKind::Direct("https://cdn.example.com/audio/Song.MP3".into())
        );
        assert_eq!(
            QueryKind::classify("/srv/music/intro.flac"),
            QueryKind::Local("/srv/music/intro.flac".into())
        );
    }

    #[test]
    fn test_file_urls_are_never_direct() {
        assert_eq!(
            QueryKind::classify("file:///etc/passwd"),
            QueryKind::Local("/etc/passwd".into())
        );
        assert_eq!(
            QueryKind::classify("file:///srv/music/../../etc/shadow.mp3"),
            QueryKind::Local("/etc/shadow.mp3".into())
        );
        // Sin extensión de audio no se trata como ruta
        assert_eq!(
            QueryKind::classify("/etc/passwd"),
            QueryKind::Search("/etc/passwd".into())
        );
    }

    #[test]
    fn test_has_audio_extension() {
        assert!(has_audio_extension(Path::new("/srv/music/Intro.FLAC")));
        assert!(!has_audio_extension(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_title_from_path() {
        assert_eq!(title_from_path("/srv/music/intro.flac"), "intro");
        assert_eq!(title_from_path("https://cdn.example.com/a/b.mp3?sig=1"), "b");
        assert_eq!(title_from_path("noext"), "noext");
    }
}
