use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{has_audio_extension, title_from_path, QueryKind, TrackResolver};
use crate::audio::track::{SourceKind, Track};

/// Entrada del JSON de yt-dlp (`--dump-json`, una por línea)
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
}

impl YtDlpEntry {
    fn into_track(self, kind: SourceKind, requester_id: u64) -> Option<Track> {
        let stream_ref = self.webpage_url.or(self.url)?;
        let title = self.title.unwrap_or_else(|| title_from_path(&stream_ref));

        let mut track = Track::new(title, stream_ref, kind, requester_id)
            .with_duration(self.duration.unwrap_or(0.0).max(0.0) as u64);
        if let Some(artist) = self.uploader.or(self.channel) {
            track = track.with_artist(artist);
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        Some(track)
    }
}

/// Convierte la salida de yt-dlp en tracks, ignorando líneas inválidas
fn parse_entries(stdout: &str, kind: SourceKind, requester_id: u64) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_track(kind, requester_id),
            Err(e) => {
                warn!("⚠️ Línea de yt-dlp inválida: {}", e);
                None
            }
        })
        .collect()
}

/// Resolvedor basado en yt-dlp
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    search_results: usize,
    max_playlist: usize,
    music_dir: Option<PathBuf>,
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(ytdlp_path: PathBuf, search_results: usize, max_playlist: usize) -> Self {
        Self {
            ytdlp_path,
            search_results: search_results.max(1),
            max_playlist: max_playlist.max(1),
            music_dir: None,
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Habilita archivos locales, solo dentro de `music_dir`
    pub fn with_music_dir(mut self, music_dir: Option<PathBuf>) -> Self {
        self.music_dir = music_dir;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn search(&self, query: &str, requester_id: u64) -> Result<Vec<Track>> {
        info!("🔍 Buscando: {}", query);
        let search_query = format!("ytsearch{}:{}", self.search_results, query);

        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_entries(&stdout, SourceKind::VideoHost, requester_id)
            .into_iter()
            .take(1)
            .collect())
    }

    async fn video(&self, url: &str, requester_id: u64) -> Result<Vec<Track>> {
        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;

        Ok(parse_entries(&stdout, SourceKind::VideoHost, requester_id))
    }

    async fn playlist(&self, url: &str, requester_id: u64) -> Result<Vec<Track>> {
        info!("📋 Obteniendo playlist: {}", url);
        let max_items = self.max_playlist.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &max_items,
                "--no-warnings",
                url,
            ])
            .await?;

        let tracks = parse_entries(&stdout, SourceKind::ExternalPlaylist, requester_id);
        info!("🎵 Playlist extraída con {} tracks", tracks.len());
        Ok(tracks)
    }

    async fn local(&self, path: &Path, requester_id: u64) -> Result<Vec<Track>> {
        let Some(music_dir) = &self.music_dir else {
            warn!("🚫 Archivo local rechazado (sin carpeta de música): {}", path.display());
            anyhow::bail!("Los archivos locales no están habilitados en este servidor");
        };

        let root = tokio::fs::canonicalize(music_dir)
            .await
            .with_context(|| format!("Carpeta de música inválida: {}", music_dir.display()))?;
        // Resuelve `..` y symlinks antes de comparar
        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| anyhow::anyhow!("Archivo no encontrado: {}", path.display()))?;

        if !resolved.starts_with(&root) {
            warn!("🚫 Archivo fuera de la carpeta de música: {}", resolved.display());
            anyhow::bail!("Solo se pueden reproducir archivos de la carpeta de música");
        }
        if !has_audio_extension(&resolved) {
            anyhow::bail!("El archivo no es de audio: {}", path.display());
        }

        let stream_ref = resolved.to_string_lossy().into_owned();
        debug!("📁 Archivo local: {}", stream_ref);
        Ok(vec![Track::new(
            title_from_path(&stream_ref),
            stream_ref,
            SourceKind::Local,
            requester_id,
        )])
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester_id: u64) -> Result<Vec<Track>> {
        let tracks = match QueryKind::classify(query) {
            QueryKind::Search(text) => self.search(&text, requester_id).await?,
            QueryKind::Video(url) => self.video(&url, requester_id).await?,
            QueryKind::Playlist(url) => self.playlist(&url, requester_id).await?,
            QueryKind::Direct(url) => vec![Track::new(
                title_from_path(&url),
                url,
                SourceKind::Local,
                requester_id,
            )],
            QueryKind::Local(path) => self.local(&path, requester_id).await?,
        };

        if tracks.is_empty() {
            anyhow::bail!("No se encontraron resultados para: {}", query);
        }
        Ok(tracks)
    }
}
