//! Coordinador de reproducción por guild.
//!
//! [`GuildPlayer`] es el único dueño de la cola, los filtros, el volumen y la
//! fuente en vivo de una guild. Todas las operaciones pasan por un único
//! `Mutex` asíncrono, así que un reinicio de filtros nunca se intercala con
//! otro cambio de la misma guild.
//!
//! Cada fuente se crea con la generación vigente. Detener una fuente a la
//! fuerza (skip, stop, reaplicar filtros) incrementa la generación antes de
//! pararla, y los avisos de fin con una generación vieja se ignoran.

use async_trait::async_trait;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        events::{PlayerEvent, PlayerEventKind},
        filters::FilterRegistry,
        media::{EndedHook, HandleRequest, MediaAdapter, MediaHandle, PlaybackListener},
        queue::{MusicQueue, QueueInfo, RepeatMode},
        track::Track,
    },
    error::{PlayerError, PlayerResult},
    storage::GuildSnapshot,
};

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 2.0;

/// Parte de la configuración que usa el coordinador
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub max_queue_size: usize,
    pub default_volume: f32,
    /// Espera entre parar la fuente vieja y crear la nueva al reaplicar filtros
    pub restart_settle: Duration,
    /// Tiempo máximo esperando el turno de la guild antes de `ConcurrencyConflict`
    pub lock_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            default_volume: 1.0,
            restart_settle: Duration::from_millis(150),
            lock_timeout: Duration::from_secs(15),
        }
    }
}

pub fn validate_volume(volume: f32) -> PlayerResult<()> {
    if volume.is_finite() && (MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
        Ok(())
    } else {
        Err(PlayerError::validation(format!(
            "El volumen debe estar entre {}% y {}%",
            (MIN_VOLUME * 100.0) as u32,
            (MAX_VOLUME * 100.0) as u32
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

/// Estado de una guild. Solo se toca con el lock de [`GuildPlayer`] tomado.
pub struct GuildPlaybackState {
    queue: MusicQueue,
    filters: FilterRegistry,
    volume: f32,
    status: PlaybackStatus,
    handle: Option<Box<dyn MediaHandle>>,
    generation: u64,
}

impl GuildPlaybackState {
    fn new(settings: &PlayerSettings) -> Self {
        Self {
            queue: MusicQueue::new(settings.max_queue_size),
            filters: FilterRegistry::with_defaults(),
            volume: settings.default_volume,
            status: PlaybackStatus::Idle,
            handle: None,
            generation: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.status != PlaybackStatus::Idle
    }

    /// Detiene la fuente actual invalidando antes su generación, para que su
    /// aviso de fin (que llega más tarde) no avance la cola.
    fn release_handle(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                warn!("⚠️ Error al detener la fuente de audio: {}", e);
            }
        }
    }
}

/// Resultado de agregar tracks a la cola
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub added: usize,
    /// Posición (base 0) del primer track agregado
    pub position: usize,
    /// Track que empezó a sonar como consecuencia
    pub started: Option<Track>,
}

pub struct GuildPlayer {
    guild_id: u64,
    state: Mutex<GuildPlaybackState>,
    adapter: Arc<dyn MediaAdapter>,
    events: flume::Sender<PlayerEvent>,
    settings: PlayerSettings,
    me: Weak<GuildPlayer>,
}

impl GuildPlayer {
    pub fn new(
        guild_id: u64,
        adapter: Arc<dyn MediaAdapter>,
        settings: PlayerSettings,
        events: flume::Sender<PlayerEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            guild_id,
            state: Mutex::new(GuildPlaybackState::new(&settings)),
            adapter,
            events,
            settings,
            me: me.clone(),
        })
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    async fn lock(&self) -> PlayerResult<MutexGuard<'_, GuildPlaybackState>> {
        tokio::time::timeout(self.settings.lock_timeout, self.state.lock())
            .await
            .map_err(|_| {
                warn!(
                    "⏳ Guild {} ocupada más de {:?}, se rechaza la operación",
                    self.guild_id, self.settings.lock_timeout
                );
                PlayerError::ConcurrencyConflict
            })
    }

    // Cola

    /// Agrega un track y, si no hay nada sonando, arranca la reproducción
    pub async fn enqueue(&self, track: Track) -> PlayerResult<Enqueued> {
        let mut state = self.lock().await?;
        let position = state.queue.add(track)?;

        let started = if state.is_active() {
            None
        } else {
            self.start_next(&mut state).await?
        };

        Ok(Enqueued {
            added: 1,
            position,
            started,
        })
    }

    /// Agrega varios tracks (playlist) hasta llenar la cola
    pub async fn enqueue_many(&self, tracks: Vec<Track>) -> PlayerResult<Enqueued> {
        let mut state = self.lock().await?;
        let position = state.queue.len();
        let requested = tracks.len();
        let mut added = 0;

        for track in tracks {
            match state.queue.add(track) {
                Ok(_) => added += 1,
                Err(PlayerError::CapacityExceeded { max }) => {
                    if added == 0 {
                        return Err(PlayerError::CapacityExceeded { max });
                    }
                    warn!(
                        "⚠️ Cola llena, se agregaron {} de {} canciones",
                        added, requested
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        info!("➕ Agregadas {} canciones a la cola", added);

        let started = if state.is_active() || added == 0 {
            None
        } else {
            self.start_next(&mut state).await?
        };

        Ok(Enqueued {
            added,
            position,
            started,
        })
    }

    /// Quita un track de la cola. Si es el que suena, se pasa al siguiente.
    pub async fn remove(&self, index: usize) -> PlayerResult<Track> {
        let mut state = self.lock().await?;

        if state.is_active() && state.queue.current_index() == Some(index) {
            state.release_handle();
            let (removed, next) = state.queue.remove_current().ok_or_else(|| {
                PlayerError::validation(format!("No hay ninguna canción en la posición {}", index + 1))
            })?;
            self.start_from(&mut state, next).await?;
            return Ok(removed);
        }

        state
            .queue
            .remove(index)
            .ok_or_else(|| PlayerError::validation(format!("No hay ninguna canción en la posición {}", index + 1)))
    }

    /// Mueve un track dentro de la cola; el actual sigue sonando
    pub async fn move_track(&self, from: usize, to: usize) -> PlayerResult<()> {
        self.lock().await?.queue.move_track(from, to)
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> PlayerResult<()> {
        self.lock().await?.queue.set_repeat_mode(mode);
        Ok(())
    }

    pub async fn cycle_repeat_mode(&self) -> PlayerResult<RepeatMode> {
        Ok(self.lock().await?.queue.cycle_repeat_mode())
    }

    pub async fn toggle_shuffle(&self) -> PlayerResult<bool> {
        Ok(self.lock().await?.queue.toggle_shuffle())
    }

    // Transiciones

    /// Idle -> Playing: avanza la cola y abre la fuente del siguiente track
    pub async fn play(&self) -> PlayerResult<Option<Track>> {
        let mut state = self.lock().await?;
        if state.is_active() {
            return Err(PlayerError::validation("Ya hay algo reproduciéndose"));
        }
        self.start_next(&mut state).await
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        let mut state = self.lock().await?;
        if state.status != PlaybackStatus::Playing {
            return Err(PlayerError::validation("No hay nada reproduciéndose"));
        }
        if let Some(handle) = &state.handle {
            handle.pause()?;
        }
        state.status = PlaybackStatus::Paused;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        let mut state = self.lock().await?;
        if state.status != PlaybackStatus::Paused {
            return Err(PlayerError::validation("La reproducción no está pausada"));
        }
        if let Some(handle) = &state.handle {
            handle.resume()?;
        }
        state.status = PlaybackStatus::Playing;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    /// Salta al siguiente track según el modo de repetición
    pub async fn skip(&self) -> PlayerResult<Option<Track>> {
        let mut state = self.lock().await?;
        if !state.is_active() {
            return Err(PlayerError::validation("No hay nada reproduciéndose"));
        }

        state.release_handle();
        let next = state.queue.advance();
        info!("⏭️ Track saltado en guild {}", self.guild_id);
        self.start_from(&mut state, next).await
    }

    /// Detiene todo y limpia la cola. Los filtros y el volumen se conservan.
    /// Se puede llamar en cualquier estado.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.release_handle();
        state.queue.clear();
        state.status = PlaybackStatus::Idle;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    /// Ajusta el volumen (0.0 - 2.0) y lo aplica a la fuente en vivo sin reiniciarla
    pub async fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        validate_volume(volume)?;

        let mut state = self.lock().await?;
        state.volume = volume;
        if let Some(handle) = &state.handle {
            handle.set_volume(volume)?;
        }
        info!("🔊 Volumen ajustado a {}%", (volume * 100.0).round() as u32);
        Ok(())
    }

    /// Reconstruye la fuente del track actual con la cadena de filtros y el
    /// volumen vigentes, conservando la pausa.
    pub async fn reapply_filters_live(&self) -> PlayerResult<()> {
        let mut state = self.lock().await?;
        self.reapply_locked(&mut state).await
    }

    /// Reaplica los filtros solo si hay algo sonando. Devuelve si hubo reinicio.
    ///
    /// El cambio de filtros ya quedó guardado aunque el reinicio falle.
    pub async fn reapply_if_active(&self) -> PlayerResult<bool> {
        let mut state = self.lock().await?;
        if !state.is_active() {
            return Ok(false);
        }
        self.reapply_locked(&mut state).await?;
        Ok(true)
    }

    async fn reapply_locked(&self, state: &mut GuildPlaybackState) -> PlayerResult<()> {
        let track = match state.queue.current() {
            Some(track) if state.is_active() => track.clone(),
            _ => return Err(PlayerError::validation("No hay nada reproduciéndose")),
        };
        let was_paused = state.status == PlaybackStatus::Paused;

        state.release_handle();
        if !self.settings.restart_settle.is_zero() {
            tokio::time::sleep(self.settings.restart_settle).await;
        }

        if let Err(e) = self.open_handle(state, &track).await {
            error!("❌ No se pudo reaplicar filtros a '{}': {}", track.title(), e);
            let next = self.drop_current(state, &track, &e);
            self.start_from(state, next).await?;
            return Err(PlayerError::PlaybackFailure(e.to_string()));
        }

        if was_paused {
            let paused = state.handle.as_ref().map(|handle| handle.pause());
            if let Some(Err(e)) = paused {
                warn!("⚠️ No se pudo volver a pausar tras reaplicar filtros: {}", e);
                state.status = PlaybackStatus::Playing;
            }
        }

        info!(
            "🎛️ Filtros reaplicados en guild {}: '{}'",
            self.guild_id,
            state.filters.combined_chain()
        );
        Ok(())
    }

    // Filtros

    pub async fn enable_filter(&self, name: &str) -> PlayerResult<()> {
        self.lock().await?.filters.try_enable(name)
    }

    pub async fn disable_filter(&self, name: &str) -> PlayerResult<()> {
        self.lock().await?.filters.try_disable(name)
    }

    pub async fn set_filter_parameter(
        &self,
        filter: &str,
        param: &str,
        value: f64,
    ) -> PlayerResult<()> {
        self.lock().await?.filters.try_set_parameter(filter, param, value)
    }

    pub async fn apply_preset(&self, name: &str) -> PlayerResult<()> {
        self.lock().await?.filters.try_apply_preset(name)
    }

    pub async fn reset_filters(&self) -> PlayerResult<()> {
        self.lock().await?.filters.reset();
        Ok(())
    }

    /// Acceso de solo lectura al registro de filtros
    pub async fn with_filters<R>(&self, f: impl FnOnce(&FilterRegistry) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.filters)
    }

    // Consultas

    pub async fn status(&self) -> PlaybackStatus {
        self.state.lock().await.status
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    pub async fn now_playing(&self) -> Option<Track> {
        let state = self.state.lock().await;
        if state.is_active() {
            state.queue.current().cloned()
        } else {
            None
        }
    }

    pub async fn volume(&self) -> f32 {
        self.state.lock().await.volume
    }

    pub async fn queue_info(&self) -> QueueInfo {
        self.state.lock().await.queue.get_info()
    }

    pub async fn history(&self) -> Vec<Track> {
        self.state.lock().await.queue.history().cloned().collect()
    }

    pub async fn filter_chain(&self) -> String {
        self.state.lock().await.filters.combined_chain()
    }

    pub async fn enabled_filters(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .filters
            .enabled_filters()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub async fn snapshot(&self) -> GuildSnapshot {
        let state = self.state.lock().await;
        GuildSnapshot {
            guild_id: self.guild_id,
            volume: state.volume,
            queue: state.queue.snapshot(),
            filters: state.filters.snapshot(),
            saved_at: chrono::Utc::now(),
        }
    }

    /// Carga un snapshot guardado. Solo tiene efecto si no hay nada sonando.
    pub async fn restore(&self, snapshot: GuildSnapshot) {
        let mut state = self.state.lock().await;
        if state.is_active() {
            warn!("⚠️ Guild {} activa, se ignora el snapshot", self.guild_id);
            return;
        }

        match validate_volume(snapshot.volume) {
            Ok(()) => state.volume = snapshot.volume,
            Err(_) => warn!("⚠️ Volumen guardado inválido: {}", snapshot.volume),
        }
        state.queue.restore(snapshot.queue);
        state.filters.restore(&snapshot.filters);
        debug!("📂 Estado restaurado para guild {}", self.guild_id);
    }

    // Internos

    /// Desde Idle el cursor apunta a lo último que sonó, así que el modo
    /// `Track` no repite: se pasa a lo siguiente que haya en la cola.
    async fn start_next(
        &self,
        state: &mut GuildPlaybackState,
    ) -> PlayerResult<Option<Track>> {
        let next = if state.is_active() {
            state.queue.advance()
        } else {
            state.queue.advance_past_current()
        };
        self.start_from(state, next).await
    }

    /// Intenta reproducir `next`. Los tracks que no se pueden abrir se quitan
    /// de la cola y se prueba con el siguiente; si no queda nada la guild pasa
    /// a Idle.
    async fn start_from(
        &self,
        state: &mut GuildPlaybackState,
        mut next: Option<Track>,
    ) -> PlayerResult<Option<Track>> {
        let was_active = state.is_active();
        let mut last_error = None;

        while let Some(track) = next {
            match self.open_handle(state, &track).await {
                Ok(()) => {
                    state.status = PlaybackStatus::Playing;
                    info!("🎵 Reproduciendo: {} (guild {})", track.title(), self.guild_id);
                    self.emit(PlayerEventKind::TrackStarted(track.clone()));
                    return Ok(Some(track));
                }
                Err(e) => {
                    error!("❌ No se pudo reproducir '{}': {}", track.title(), e);
                    next = self.drop_current(state, &track, &e);
                    last_error = Some(e);
                }
            }
        }

        state.status = PlaybackStatus::Idle;
        if was_active || last_error.is_some() {
            info!("📭 Cola terminada en guild {}", self.guild_id);
            self.emit(PlayerEventKind::QueueFinished);
        }

        match last_error {
            Some(e) => Err(PlayerError::PlaybackFailure(e.to_string())),
            None => Ok(None),
        }
    }

    async fn open_handle(&self, state: &mut GuildPlaybackState, track: &Track) -> PlayerResult<()> {
        if state.handle.is_some() {
            state.release_handle();
        }

        state.generation += 1;
        let request = HandleRequest {
            stream_ref: track.stream_ref().to_string(),
            source_kind: track.source_kind(),
            filter_chain: state.filters.combined_chain(),
            volume: state.volume,
        };
        let listener: Weak<dyn PlaybackListener> = self.me.clone();
        let hook = EndedHook::new(state.generation, listener);

        let handle = self.adapter.create_handle(request, hook).await?;
        state.handle = Some(handle);
        Ok(())
    }

    /// Quita de la cola el track actual que falló, avisa y devuelve el siguiente
    fn drop_current(
        &self,
        state: &mut GuildPlaybackState,
        track: &Track,
        reason: &PlayerError,
    ) -> Option<Track> {
        self.emit(PlayerEventKind::TrackSkippedDueToError {
            track: track.clone(),
            reason: reason.to_string(),
        });
        state.queue.remove_current().and_then(|(_, next)| next)
    }

    fn emit(&self, kind: PlayerEventKind) {
        let event = PlayerEvent {
            guild_id: self.guild_id,
            kind,
        };
        if self.events.send(event).is_err() {
            debug!("Nadie escucha los eventos de reproducción");
        }
    }
}

#[async_trait]
impl PlaybackListener for GuildPlayer {
    async fn playback_ended(&self, generation: u64, error: Option<String>) {
        let mut state = self.state.lock().await;

        if generation != state.generation || !state.is_active() {
            debug!(
                "Aviso de fin obsoleto en guild {} (generación {}, vigente {})",
                self.guild_id, generation, state.generation
            );
            return;
        }

        state.handle = None;
        let result = match error {
            // Un stream roto se quita igual que uno que no se pudo abrir
            Some(reason) => {
                warn!(
                    "⚠️ La reproducción terminó con error en guild {}: {}",
                    self.guild_id, reason
                );
                let next = match state.queue.current().cloned() {
                    Some(track) => {
                        self.drop_current(&mut state, &track, &PlayerError::PlaybackFailure(reason))
                    }
                    None => None,
                };
                self.start_from(&mut state, next).await
            }
            None => {
                debug!("Track terminado en guild {}, siguiente...", self.guild_id);
                self.start_next(&mut state).await
            }
        };

        if let Err(e) = result {
            error!("Error al reproducir siguiente track: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::media::MockMediaHandle;
    use crate::audio::testing::{track, FakeAdapter};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn settings() -> PlayerSettings {
        PlayerSettings {
            max_queue_size: 10,
            default_volume: 1.0,
            restart_settle: Duration::ZERO,
            lock_timeout: Duration::from_secs(5),
        }
    }

    fn setup_with(
        adapter: &Arc<FakeAdapter>,
        settings: PlayerSettings,
    ) -> (Arc<GuildPlayer>, flume::Receiver<PlayerEvent>) {
        let (tx, rx) = flume::unbounded();
        let player = GuildPlayer::new(7, adapter.clone(), settings, tx);
        (player, rx)
    }

    fn setup(adapter: &Arc<FakeAdapter>) -> (Arc<GuildPlayer>, flume::Receiver<PlayerEvent>) {
        setup_with(adapter, settings())
    }

    fn kinds(rx: &flume::Receiver<PlayerEvent>) -> Vec<PlayerEventKind> {
        rx.drain().map(|event| event.kind).collect()
    }

    #[tokio::test]
    async fn test_enqueue_starts_playback_when_idle() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        let a = track("a");

        let enqueued = player.enqueue(a.clone()).await.unwrap();

        assert_eq!(enqueued.position, 0);
        assert_eq!(enqueued.started, Some(a.clone()));
        assert_eq!(player.status().await, PlaybackStatus::Playing);
        assert_eq!(player.now_playing().await, Some(a.clone()));

        let request = adapter.last_request().unwrap();
        assert_eq!(request.stream_ref, a.stream_ref());
        assert_eq!(request.filter_chain, "");
        assert_eq!(request.volume, 1.0);
        assert_eq!(kinds(&rx), vec![PlayerEventKind::TrackStarted(a)]);
    }

    #[tokio::test]
    async fn test_enqueue_while_playing_only_queues() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        player.enqueue(track("a")).await.unwrap();
        let enqueued = player.enqueue(track("b")).await.unwrap();

        assert_eq!(enqueued.position, 1);
        assert_eq!(enqueued.started, None);
        assert_eq!(adapter.created(), 1);
        assert_eq!(player.queue_info().await.items.len(), 2);
    }

    #[tokio::test]
    async fn test_play_on_empty_queue_stays_idle() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);

        assert_eq!(player.play().await, Ok(None));
        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert_eq!(adapter.created(), 0);
        assert!(kinds(&rx).is_empty());
    }

    #[tokio::test]
    async fn test_play_while_playing_is_rejected() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();

        assert!(matches!(player.play().await, Err(PlayerError::Validation(_))));
        assert_eq!(adapter.created(), 1);
    }

    #[tokio::test]
    async fn test_natural_end_advances_and_finishes() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        let (a, b) = (track("a"), track("b"));
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();

        adapter.hooks()[0].fire(None).await;
        assert_eq!(player.now_playing().await, Some(b.clone()));

        adapter.hooks()[1].fire(None).await;
        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert_eq!(player.now_playing().await, None);
        assert_eq!(
            kinds(&rx),
            vec![
                PlayerEventKind::TrackStarted(a),
                PlayerEventKind::TrackStarted(b),
                PlayerEventKind::QueueFinished,
            ]
        );
    }

    #[tokio::test]
    async fn test_repeat_track_replays_on_natural_end() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let a = track("a");
        player.enqueue_many(vec![a.clone(), track("b")]).await.unwrap();
        player.set_repeat_mode(RepeatMode::Track).await.unwrap();

        adapter.hooks()[0].fire(None).await;

        assert_eq!(adapter.created(), 2);
        assert_eq!(adapter.last_request().unwrap().stream_ref, a.stream_ref());
        assert_eq!(player.queue_info().await.current_index, Some(0));
    }

    #[tokio::test]
    async fn test_error_end_under_repeat_track_drops_broken_track() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        let (a, b) = (track("a"), track("b"));
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();
        player.set_repeat_mode(RepeatMode::Track).await.unwrap();
        kinds(&rx);

        adapter.hooks()[0].fire(Some("decode error".into())).await;

        assert_eq!(player.now_playing().await, Some(b.clone()));
        assert_eq!(adapter.created(), 2);
        assert_eq!(adapter.last_request().unwrap().stream_ref, b.stream_ref());
        assert_eq!(player.queue_info().await.items, vec![b.clone()]);
        let events = kinds(&rx);
        assert!(matches!(
            &events[0],
            PlayerEventKind::TrackSkippedDueToError { track, .. } if *track == a
        ));
        assert_eq!(events[1], PlayerEventKind::TrackStarted(b.clone()));

        // El último también se rompe: no se reintenta
        adapter.hooks()[1].fire(Some("decode error".into())).await;

        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert_eq!(adapter.created(), 2);
        assert!(player.queue_info().await.items.is_empty());
        let events = kinds(&rx);
        assert!(matches!(
            &events[0],
            PlayerEventKind::TrackSkippedDueToError { track, .. } if *track == b
        ));
        assert_eq!(events[1], PlayerEventKind::QueueFinished);
    }

    #[tokio::test]
    async fn test_enqueue_after_queue_finished_plays_new_track_under_repeat_track() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();
        adapter.hooks()[0].fire(None).await;
        assert_eq!(player.status().await, PlaybackStatus::Idle);
        player.set_repeat_mode(RepeatMode::Track).await.unwrap();
        let x = track("x");

        let enqueued = player.enqueue(x.clone()).await.unwrap();

        assert_eq!(enqueued.started, Some(x.clone()));
        assert_eq!(adapter.last_request().unwrap().stream_ref, x.stream_ref());
        assert_eq!(player.queue_info().await.current_index, Some(1));
    }

    #[tokio::test]
    async fn test_skip_with_repeat_all_wraps_and_records_history() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let (a, b) = (track("a"), track("b"));
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();
        player.set_repeat_mode(RepeatMode::All).await.unwrap();

        assert_eq!(player.skip().await, Ok(Some(b.clone())));
        assert_eq!(player.skip().await, Ok(Some(a.clone())));

        assert_eq!(player.queue_info().await.current_index, Some(0));
        assert_eq!(player.history().await, vec![b]);
        assert_eq!(adapter.handle(0).stops(), 1);
        assert_eq!(adapter.handle(1).stops(), 1);
        assert_eq!(player.status().await, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_skip_past_last_track_goes_idle() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();
        kinds(&rx);

        assert_eq!(player.skip().await, Ok(None));
        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert_eq!(kinds(&rx), vec![PlayerEventKind::QueueFinished]);
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_rejected() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        assert!(matches!(player.skip().await, Err(PlayerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_late_ended_signal_after_skip_is_ignored() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let b = track("b");
        player
            .enqueue_many(vec![track("a"), b.clone(), track("c")])
            .await
            .unwrap();
        let stale = adapter.hooks()[0].clone();

        player.skip().await.unwrap();
        stale.fire(None).await;

        assert_eq!(player.now_playing().await, Some(b));
        assert_eq!(adapter.created(), 2);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        assert!(matches!(player.pause().await, Err(PlayerError::Validation(_))));

        player.enqueue(track("a")).await.unwrap();
        player.pause().await.unwrap();
        assert_eq!(player.status().await, PlaybackStatus::Paused);
        assert!(matches!(player.pause().await, Err(PlayerError::Validation(_))));

        player.resume().await.unwrap();
        assert_eq!(player.status().await, PlaybackStatus::Playing);
        assert!(matches!(player.resume().await, Err(PlayerError::Validation(_))));

        let log = adapter.handle(0);
        assert_eq!(log.pauses(), 1);
        assert_eq!(log.resumes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_clears_queue_but_keeps_settings() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.enqueue_many(vec![track("a"), track("b")]).await.unwrap();
        player.enable_filter("bass_boost").await.unwrap();
        player.set_volume(0.5).await.unwrap();
        let stale = adapter.hooks()[0].clone();

        player.stop().await;
        stale.fire(None).await;

        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert!(player.queue_info().await.items.is_empty());
        assert_eq!(adapter.handle(0).stops(), 1);
        assert_eq!(adapter.created(), 1);
        assert_eq!(player.volume().await, 0.5);
        assert!(player.filter_chain().await.contains("bass=g=15"));
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_harmless() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        player.stop().await;
        assert_eq!(player.status().await, PlaybackStatus::Idle);
    }

    #[tokio::test]
    async fn test_volume_bounds() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        assert!(matches!(
            player.set_volume(2.5).await,
            Err(PlayerError::Validation(_))
        ));
        assert!(matches!(
            player.set_volume(-0.1).await,
            Err(PlayerError::Validation(_))
        ));
        assert!(matches!(
            player.set_volume(f32::NAN).await,
            Err(PlayerError::Validation(_))
        ));
        assert_eq!(player.volume().await, 1.0);

        player.set_volume(0.0).await.unwrap();
        player.set_volume(2.0).await.unwrap();
        assert_eq!(player.volume().await, 2.0);
    }

    #[tokio::test]
    async fn test_volume_applies_to_live_handle_once() {
        let adapter = FakeAdapter::new();
        let mut handle = MockMediaHandle::new();
        handle
            .expect_set_volume()
            .with(eq(1.5f32))
            .times(1)
            .returning(|_| Ok(()));
        adapter.prepare(Box::new(handle));
        let (player, _rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();

        player.set_volume(1.5).await.unwrap();
        assert!(player.set_volume(3.0).await.is_err());

        assert_eq!(adapter.created(), 1);
        assert_eq!(player.volume().await, 1.5);
    }

    #[tokio::test]
    async fn test_new_handle_uses_current_volume() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.set_volume(0.3).await.unwrap();

        player.enqueue(track("a")).await.unwrap();

        assert_eq!(adapter.last_request().unwrap().volume, 0.3);
    }

    #[tokio::test]
    async fn test_reapply_filters_rebuilds_current_track() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let a = track("a");
        player.enqueue_many(vec![a.clone(), track("b")]).await.unwrap();
        player.enable_filter("bass_boost").await.unwrap();

        player.reapply_filters_live().await.unwrap();

        assert_eq!(adapter.created(), 2);
        assert_eq!(adapter.handle(0).stops(), 1);
        let request = adapter.last_request().unwrap();
        assert_eq!(request.stream_ref, a.stream_ref());
        assert!(request.filter_chain.contains("bass=g=15"));
        assert_eq!(player.enabled_filters().await, vec!["bass_boost".to_string()]);
        assert_eq!(player.queue_info().await.current_index, Some(0));
        assert_eq!(player.status().await, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_reapply_filters_keeps_pause() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();
        player.pause().await.unwrap();
        player.apply_preset("music").await.unwrap();

        player.reapply_filters_live().await.unwrap();

        assert_eq!(player.status().await, PlaybackStatus::Paused);
        assert_eq!(adapter.handle(1).pauses(), 1);
        assert!(adapter.last_request().unwrap().filter_chain.contains("bass=g=8"));
    }

    #[tokio::test]
    async fn test_reapply_filters_ignores_ended_signal_of_old_handle() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        player.enqueue_many(vec![track("a"), track("b")]).await.unwrap();
        let old = adapter.hooks()[0].clone();
        kinds(&rx);

        player.reapply_filters_live().await.unwrap();
        old.fire(None).await;

        assert_eq!(player.queue_info().await.current_index, Some(0));
        assert_eq!(player.status().await, PlaybackStatus::Playing);
        assert_eq!(adapter.created(), 2);
        assert!(kinds(&rx).is_empty());
    }

    #[tokio::test]
    async fn test_reapply_filters_when_idle_is_rejected() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);

        assert!(matches!(
            player.reapply_filters_live().await,
            Err(PlayerError::Validation(_))
        ));
        assert_eq!(adapter.created(), 0);
    }

    #[tokio::test]
    async fn test_failed_track_is_dropped_and_next_plays() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        let (a, b, c) = (track("a"), track("b"), track("c"));
        adapter.fail_on(&b);
        player
            .enqueue_many(vec![a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();
        kinds(&rx);

        adapter.hooks()[0].fire(None).await;

        assert_eq!(player.now_playing().await, Some(c.clone()));
        let titles: Vec<String> = player
            .queue_info()
            .await
            .items
            .iter()
            .map(|t| t.title().to_string())
            .collect();
        assert_eq!(titles, vec!["a", "c"]);

        let events = kinds(&rx);
        assert!(matches!(
            &events[0],
            PlayerEventKind::TrackSkippedDueToError { track, .. } if *track == b
        ));
        assert_eq!(events[1], PlayerEventKind::TrackStarted(c));
    }

    #[tokio::test]
    async fn test_failure_with_nothing_left_reports_playback_failure() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        let a = track("a");
        adapter.fail_on(&a);

        let result = player.enqueue(a).await;

        assert!(matches!(result, Err(PlayerError::PlaybackFailure(_))));
        assert_eq!(player.status().await, PlaybackStatus::Idle);
        assert!(player.queue_info().await.items.is_empty());
        let events = kinds(&rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], PlayerEventKind::QueueFinished);
    }

    #[tokio::test]
    async fn test_failure_under_repeat_track_does_not_loop() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let (a, b) = (track("a"), track("b"));
        player.set_repeat_mode(RepeatMode::Track).await.unwrap();
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();
        adapter.fail_on(&a);

        player.reapply_filters_live().await.unwrap_err();

        assert_eq!(player.now_playing().await, Some(b));
        assert_eq!(adapter.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup_with(
            &adapter,
            PlayerSettings {
                max_queue_size: 2,
                ..settings()
            },
        );

        let enqueued = player
            .enqueue_many(vec![track("a"), track("b"), track("c")])
            .await
            .unwrap();
        assert_eq!(enqueued.added, 2);

        assert_eq!(
            player.enqueue(track("d")).await,
            Err(PlayerError::CapacityExceeded { max: 2 })
        );
    }

    #[tokio::test]
    async fn test_remove_current_plays_next() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let (a, b) = (track("a"), track("b"));
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();

        assert_eq!(player.remove(0).await, Ok(a));
        assert_eq!(player.now_playing().await, Some(b));
        assert_eq!(adapter.handle(0).stops(), 1);
        assert!(matches!(player.remove(5).await, Err(PlayerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_remove_last_current_under_repeat_all_restarts_queue() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let (a, b, c) = (track("a"), track("b"), track("c"));
        player
            .enqueue_many(vec![a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();
        player.set_repeat_mode(RepeatMode::All).await.unwrap();
        adapter.hooks()[0].fire(None).await;
        adapter.hooks()[1].fire(None).await;
        assert_eq!(player.now_playing().await, Some(c.clone()));

        assert_eq!(player.remove(2).await, Ok(c));

        assert_eq!(player.now_playing().await, Some(a));
        assert!(player.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_move_track_keeps_current_playing() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        let (a, b, c) = (track("a"), track("b"), track("c"));
        player
            .enqueue_many(vec![a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();

        player.move_track(2, 0).await.unwrap();

        assert_eq!(player.now_playing().await, Some(a.clone()));
        assert_eq!(player.queue_info().await.items, vec![c, a, b]);
        assert_eq!(adapter.created(), 1);
        assert!(matches!(
            player.move_track(0, 9).await,
            Err(PlayerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reapply_if_active_keeps_filter_change_when_restart_fails() {
        let adapter = FakeAdapter::new();
        let (player, rx) = setup(&adapter);
        player.enable_filter("bass_boost").await.unwrap();
        assert_eq!(player.reapply_if_active().await, Ok(false));
        assert_eq!(adapter.created(), 0);

        let (a, b) = (track("a"), track("b"));
        player.enqueue_many(vec![a.clone(), b.clone()]).await.unwrap();
        adapter.fail_on(&a);
        player
            .set_filter_parameter("bass_boost", "gain", 10.0)
            .await
            .unwrap();
        kinds(&rx);

        let result = player.reapply_if_active().await;

        assert!(matches!(result, Err(PlayerError::PlaybackFailure(_))));
        assert!(player.filter_chain().await.contains("bass=g=10"));
        assert_eq!(player.now_playing().await, Some(b.clone()));
        assert!(adapter.last_request().unwrap().filter_chain.contains("bass=g=10"));
        assert!(matches!(
            &kinds(&rx)[0],
            PlayerEventKind::TrackSkippedDueToError { track, .. } if *track == a
        ));
    }

    #[tokio::test]
    async fn test_snapshot_and_restore() {
        let adapter = FakeAdapter::new();
        let (player, _rx) = setup(&adapter);
        player.enqueue_many(vec![track("a"), track("b")]).await.unwrap();
        player.set_volume(0.8).await.unwrap();
        player.set_filter_parameter("nightcore", "tempo", 1.5).await.unwrap();
        player.enable_filter("nightcore").await.unwrap();
        player.set_repeat_mode(RepeatMode::All).await.unwrap();

        let snapshot = player.snapshot().await;

        let (restored, _rx) = setup(&adapter);
        restored.restore(snapshot.clone()).await;

        assert_eq!(restored.volume().await, 0.8);
        assert_eq!(restored.filter_chain().await, player.filter_chain().await);
        let info = restored.queue_info().await;
        assert_eq!(info.items.len(), 2);
        assert_eq!(info.repeat_mode, RepeatMode::All);
        assert_eq!(restored.status().await, PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_wait_for_restart_in_progress() {
        let adapter = FakeAdapter::with_delay(Duration::from_millis(100));
        let (player, _rx) = setup(&adapter);
        player.enqueue(track("a")).await.unwrap();

        let first = player.clone();
        let second = player.clone();
        let (r1, r2) = tokio::join!(
            first.reapply_filters_live(),
            second.reapply_filters_live()
        );

        assert_eq!(r1, Ok(()));
        assert_eq!(r2, Ok(()));
        assert_eq!(adapter.created(), 3);
        assert_eq!(adapter.handle(0).stops(), 1);
        assert_eq!(adapter.handle(1).stops(), 1);
        assert_eq!(adapter.handle(2).stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_timeout_reports_conflict() {
        let adapter = FakeAdapter::with_delay(Duration::from_millis(100));
        let (player, _rx) = setup_with(
            &adapter,
            PlayerSettings {
                lock_timeout: Duration::from_millis(10),
                ..settings()
            },
        );
        player.enqueue(track("a")).await.unwrap();

        let restarting = player.clone();
        let restart = tokio::spawn(async move { restarting.reapply_filters_live().await });
        while adapter.requests().len() < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(player.skip().await, Err(PlayerError::ConcurrencyConflict));
        assert_eq!(restart.await.unwrap(), Ok(()));
        assert_eq!(player.queue_info().await.current_index, Some(0));
    }
}
