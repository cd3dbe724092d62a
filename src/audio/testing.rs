//! Adaptador de audio en memoria para los tests del coordinador.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        media::{EndedHook, HandleRequest, MediaAdapter, MediaHandle},
        track::{SourceKind, Track},
    },
    error::{PlayerError, PlayerResult},
};

pub fn track(name: &str) -> Track {
    Track::new(
        name,
        format!("https://example.com/watch?v={name}"),
        SourceKind::VideoHost,
        42,
    )
    .with_duration(180)
}

/// Lo que le pasó a un handle creado por [`FakeAdapter`]
#[derive(Debug, Default)]
pub struct HandleLog {
    pub stops: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub volumes: Mutex<Vec<f32>>,
}

impl HandleLog {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

struct FakeHandle(Arc<HandleLog>);

impl MediaHandle for FakeHandle {
    fn stop(&self) -> PlayerResult<()> {
        self.0.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) -> PlayerResult<()> {
        self.0.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> PlayerResult<()> {
        self.0.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        self.0.volumes.lock().push(volume);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAdapter {
    requests: Mutex<Vec<HandleRequest>>,
    hooks: Mutex<Vec<EndedHook>>,
    handles: Mutex<Vec<Arc<HandleLog>>>,
    failing: Mutex<HashSet<String>>,
    prepared: Mutex<VecDeque<Box<dyn MediaHandle>>>,
    delay: Duration,
}

impl FakeAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cada creación tarda `delay` (con el reloj de tokio)
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Hace fallar cualquier creación para ese track
    pub fn fail_on(&self, track: &Track) {
        self.failing.lock().insert(track.stream_ref().to_string());
    }

    /// La próxima creación exitosa devuelve este handle
    pub fn prepare(&self, handle: Box<dyn MediaHandle>) {
        self.prepared.lock().push_back(handle);
    }

    /// Todas las peticiones recibidas, incluidas las que fallaron
    pub fn requests(&self) -> Vec<HandleRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<HandleRequest> {
        self.requests.lock().last().cloned()
    }

    /// Hooks de los handles creados con éxito, en orden
    pub fn hooks(&self) -> Vec<EndedHook> {
        self.hooks.lock().clone()
    }

    pub fn handle(&self, index: usize) -> Arc<HandleLog> {
        self.handles.lock()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.handles.lock().len()
    }
}

#[async_trait]
impl MediaAdapter for FakeAdapter {
    async fn create_handle(
        &self,
        request: HandleRequest,
        on_ended: EndedHook,
    ) -> PlayerResult<Box<dyn MediaHandle>> {
        self.requests.lock().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().contains(&request.stream_ref) {
            return Err(PlayerError::adapter(format!(
                "stream no disponible: {}",
                request.stream_ref
            )));
        }

        let log = Arc::new(HandleLog::default());
        self.hooks.lock().push(on_ended);
        self.handles.lock().push(log.clone());

        if let Some(handle) = self.prepared.lock().pop_front() {
            return Ok(handle);
        }
        Ok(Box::new(FakeHandle(log)))
    }
}
