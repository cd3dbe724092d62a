//! Adaptador de producción: songbird + FFmpeg.
//!
//! Cada fuente es un proceso FFmpeg que entrega WAV por stdout y aplica la
//! cadena `-af`. Para sitios de video, yt-dlp descarga el audio y se lo pasa
//! a FFmpeg por un pipe.

use async_trait::async_trait;
use songbird::{
    input::{ChildContainer, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    audio::media::{EndedHook, HandleRequest, MediaAdapter, MediaHandle},
    error::{PlayerError, PlayerResult},
};

/// Argumentos de FFmpeg: entrada (`pipe:0` o ruta/URL), filtros opcionales,
/// salida PCM 48 kHz estéreo.
pub fn ffmpeg_args(input: &str, filter_chain: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if input.starts_with("http://") || input.starts_with("https://") {
        args.extend(
            ["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"]
                .map(String::from),
        );
    }
    args.extend(["-i".to_string(), input.to_string(), "-vn".to_string()]);

    if !filter_chain.is_empty() {
        args.extend(["-af".to_string(), filter_chain.to_string()]);
    }

    args.extend(
        ["-f", "wav", "-acodec", "pcm_s16le", "-ac", "2", "-ar", "48000", "pipe:1"]
            .map(String::from),
    );
    args
}

pub fn ytdlp_args(url: &str) -> Vec<String> {
    [
        "-f",
        "bestaudio/best",
        "--no-playlist",
        "--quiet",
        "--no-warnings",
        "-o",
        "-",
        url,
    ]
    .map(String::from)
    .to_vec()
}

/// Adaptador ligado a la llamada de voz de una guild
pub struct SongbirdAdapter {
    call: Arc<Mutex<Call>>,
    ffmpeg_path: PathBuf,
    ytdlp_path: PathBuf,
}

impl SongbirdAdapter {
    pub fn new(call: Arc<Mutex<Call>>, ffmpeg_path: PathBuf, ytdlp_path: PathBuf) -> Self {
        Self {
            call,
            ffmpeg_path,
            ytdlp_path,
        }
    }

    fn spawn_pipeline(&self, request: &HandleRequest) -> PlayerResult<Vec<Child>> {
        if !request.source_kind.needs_extraction() {
            let ffmpeg = Command::new(&self.ffmpeg_path)
                .args(ffmpeg_args(&request.stream_ref, &request.filter_chain))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| PlayerError::adapter(format!("no se pudo iniciar ffmpeg: {}", e)))?;
            return Ok(vec![ffmpeg]);
        }

        let mut ytdlp = Command::new(&self.ytdlp_path)
            .args(ytdlp_args(&request.stream_ref))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlayerError::adapter(format!("no se pudo iniciar yt-dlp: {}", e)))?;

        let Some(audio) = ytdlp.stdout.take() else {
            let _ = ytdlp.kill();
            return Err(PlayerError::adapter("yt-dlp no expuso su salida"));
        };

        let ffmpeg = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args("pipe:0", &request.filter_chain))
            .stdin(Stdio::from(audio))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        match ffmpeg {
            Ok(ffmpeg) => Ok(vec![ytdlp, ffmpeg]),
            Err(e) => {
                let _ = ytdlp.kill();
                Err(PlayerError::adapter(format!("no se pudo iniciar ffmpeg: {}", e)))
            }
        }
    }
}

#[async_trait]
impl MediaAdapter for SongbirdAdapter {
    async fn create_handle(
        &self,
        request: HandleRequest,
        on_ended: EndedHook,
    ) -> PlayerResult<Box<dyn MediaHandle>> {
        debug!(
            "🎧 Abriendo fuente '{}' (filtros: '{}')",
            request.stream_ref, request.filter_chain
        );

        let children = self.spawn_pipeline(&request)?;
        let input = Input::from(ChildContainer::from(children));

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(request.volume) {
            let _ = handle.stop();
            return Err(PlayerError::adapter(e));
        }

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    EndedNotifier {
                        hook: on_ended.clone(),
                    },
                )
                .map_err(|e| {
                    let _ = handle.stop();
                    PlayerError::adapter(format!("Error al agregar event handler: {}", e))
                })?;
        }

        Ok(Box::new(SongbirdHandle(handle)))
    }
}

struct SongbirdHandle(TrackHandle);

impl MediaHandle for SongbirdHandle {
    fn stop(&self) -> PlayerResult<()> {
        self.0.stop().map_err(PlayerError::adapter)
    }

    fn pause(&self) -> PlayerResult<()> {
        self.0.pause().map_err(PlayerError::adapter)
    }

    fn resume(&self) -> PlayerResult<()> {
        self.0.play().map_err(PlayerError::adapter)
    }

    fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        self.0.set_volume(volume).map_err(PlayerError::adapter)
    }
}

/// Reenvía el fin (o error) del track al coordinador
struct EndedNotifier {
    hook: EndedHook,
}

#[async_trait]
impl VoiceEventHandler for EndedNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut failure = None;
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en track: {}", e);
                    failure = Some(e.to_string());
                }
            }
        }

        // El coordinador toma su lock; no se bloquea el hilo de eventos de songbird
        let hook = self.hook.clone();
        tokio::spawn(async move { hook.fire(failure).await });

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ffmpeg_args_without_filters() {
        let args = ffmpeg_args("/music/song.flac", "");

        assert!(!args.contains(&"-af".to_string()));
        assert!(!args.contains(&"-reconnect".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
        let input = args.iter().position(|arg| arg == "-i").unwrap();
        assert_eq!(args[input + 1], "/music/song.flac");
    }

    #[test]
    fn test_ffmpeg_args_with_filters_and_remote_input() {
        let args = ffmpeg_args("https://cdn.example.com/a.mp3", "bass=g=15,dynaudnorm=f=200");

        let af = args.iter().position(|arg| arg == "-af").unwrap();
        assert_eq!(args[af + 1], "bass=g=15,dynaudnorm=f=200");
        let reconnect = args.iter().position(|arg| arg == "-reconnect").unwrap();
        let input = args.iter().position(|arg| arg == "-i").unwrap();
        assert!(reconnect < input);
    }

    #[test]
    fn test_ytdlp_writes_to_stdout() {
        let args = ytdlp_args("https://www.youtube.com/watch?v=abc");

        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
        assert!(args.windows(2).any(|pair| pair[0] == "-o" && pair[1] == "-"));
    }
}
