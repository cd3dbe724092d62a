//! Contrato con el adaptador de audio.
//!
//! El coordinador pide un [`MediaHandle`] por cada fuente que reproduce y le
//! pasa un [`EndedHook`] etiquetado con la generación vigente. Cuando la
//! fuente termina (o falla), el adaptador dispara el hook; el coordinador
//! descarta los avisos de generaciones anteriores.

use async_trait::async_trait;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use crate::audio::track::SourceKind;
use crate::error::PlayerResult;

/// Parámetros para crear una fuente en vivo
#[derive(Debug, Clone, PartialEq)]
pub struct HandleRequest {
    pub stream_ref: String,
    pub source_kind: SourceKind,
    /// Cadena `-af`; vacía significa "sin filtros"
    pub filter_chain: String,
    pub volume: f32,
}

/// Sesión de audio activa
#[cfg_attr(test, mockall::automock)]
pub trait MediaHandle: Send + Sync {
    fn stop(&self) -> PlayerResult<()>;
    fn pause(&self) -> PlayerResult<()>;
    fn resume(&self) -> PlayerResult<()>;
    fn set_volume(&self, volume: f32) -> PlayerResult<()>;
}

#[async_trait]
pub trait MediaAdapter: Send + Sync {
    async fn create_handle(
        &self,
        request: HandleRequest,
        on_ended: EndedHook,
    ) -> PlayerResult<Box<dyn MediaHandle>>;
}

/// Receptor de los avisos de fin de reproducción
#[async_trait]
pub trait PlaybackListener: Send + Sync {
    async fn playback_ended(&self, generation: u64, error: Option<String>);
}

/// Callback de fin de reproducción de un handle concreto.
///
/// Se dispara como mucho una vez aunque el adaptador lo invoque varias
/// (por ejemplo un evento de error seguido del de fin).
#[derive(Clone)]
pub struct EndedHook {
    generation: u64,
    listener: Weak<dyn PlaybackListener>,
    fired: Arc<AtomicBool>,
}

impl EndedHook {
    pub fn new(generation: u64, listener: Weak<dyn PlaybackListener>) -> Self {
        Self {
            generation,
            listener,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn fire(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = self.listener.upgrade() {
            listener.playback_ended(self.generation, error).await;
        }
    }
}

impl fmt::Debug for EndedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndedHook")
            .field("generation", &self.generation)
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(u64, Option<String>)>>,
    }

    #[async_trait]
    impl PlaybackListener for Recorder {
        async fn playback_ended(&self, generation: u64, error: Option<String>) {
            self.calls.lock().push((generation, error));
        }
    }

    #[tokio::test]
    async fn test_hook_fires_once() {
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn PlaybackListener> = recorder.clone();
        let hook = EndedHook::new(3, Arc::downgrade(&listener));

        hook.fire(Some("decode error".into())).await;
        hook.clone().fire(None).await;

        assert_eq!(
            *recorder.calls.lock(),
            vec![(3, Some("decode error".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_hook_without_listener_is_noop() {
        let listener: Arc<dyn PlaybackListener> = Arc::new(Recorder::default());
        let hook = EndedHook::new(1, Arc::downgrade(&listener));
        drop(listener);

        hook.fire(None).await;
    }
}
