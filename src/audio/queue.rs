use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info, warn};

use crate::audio::track::Track;
use crate::error::{PlayerError, PlayerResult};

/// Máximo de tracks que se guardan en el historial
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    All,
}

impl RepeatMode {
    /// Off -> Track -> All -> Off
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "off" | "none" => Some(RepeatMode::Off),
            "track" | "song" => Some(RepeatMode::Track),
            "all" | "queue" => Some(RepeatMode::All),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::Off => "desactivado",
            RepeatMode::Track => "canción",
            RepeatMode::All => "cola",
        }
    }
}

/// Estado serializable de la cola
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub current_index: Option<usize>,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub shuffle: bool,
}

/// Cola de reproducción de una guild.
///
/// Los tracks se conservan mientras se reproducen; `current` apunta al track
/// actual (`None` si todavía no empezó o la cola está vacía).
#[derive(Debug)]
pub struct MusicQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
    history: VecDeque<Track>,
    repeat_mode: RepeatMode,
    shuffle: bool,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            history: VecDeque::with_capacity(MAX_HISTORY),
            repeat_mode: RepeatMode::Off,
            shuffle: false,
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn add(&mut self, track: Track) -> PlayerResult<usize> {
        self.insert(track, None)
    }

    /// Agrega un track en una posición concreta (o al final con `None`).
    ///
    /// Nunca avanza el cursor: arrancar la reproducción le corresponde al
    /// coordinador. Devuelve el índice donde quedó el track.
    pub fn insert(&mut self, track: Track, position: Option<usize>) -> PlayerResult<usize> {
        if self.tracks.len() >= self.max_size {
            return Err(PlayerError::CapacityExceeded { max: self.max_size });
        }

        let index = position.unwrap_or(self.tracks.len());
        if index > self.tracks.len() {
            return Err(PlayerError::validation(format!(
                "Posición {} fuera de rango (la cola tiene {} canciones)",
                index + 1,
                self.tracks.len()
            )));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.tracks.insert(index, track);

        // El track actual tiene que seguir siendo el mismo
        if let Some(current) = self.current {
            if index <= current {
                self.current = Some(current + 1);
            }
        }

        Ok(index)
    }

    /// Avanza el cursor según el modo de repetición y devuelve el nuevo track actual
    pub fn advance(&mut self) -> Option<Track> {
        self.advance_with(self.repeat_mode)
    }

    /// Como [`advance`](Self::advance) pero tratando `Track` como `Off`.
    /// Se usa cuando el track actual no se puede reproducir.
    pub fn advance_past_current(&mut self) -> Option<Track> {
        let mode = match self.repeat_mode {
            RepeatMode::Track => RepeatMode::Off,
            other => other,
        };
        self.advance_with(mode)
    }

    fn advance_with(&mut self, mode: RepeatMode) -> Option<Track> {
        if self.tracks.is_empty() {
            debug!("📭 Cola vacía, no hay siguiente track");
            return None;
        }

        if mode == RepeatMode::Track {
            if let Some(track) = self.current() {
                info!("🔂 Repitiendo track: {}", track.title());
                return Some(track.clone());
            }
        }

        let next = self.current.map_or(0, |current| current + 1);
        if next < self.tracks.len() {
            self.current = Some(next);
        } else if mode == RepeatMode::All {
            if let Some(previous) = self.current().cloned() {
                self.push_history(previous);
            }
            info!("🔁 Cola repetida desde el principio");
            self.current = Some(0);
        } else {
            info!("📭 Fin de la cola");
            return None;
        }

        self.current().cloned()
    }

    /// Elimina el track en `index`. Si está en o antes del cursor, el cursor retrocede uno.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        let removed = self.tracks.remove(index);
        if let Some(current) = self.current {
            if index <= current {
                self.current = current.checked_sub(1);
            }
        }

        debug!("❌ Track eliminado en posición {}", index);
        Some(removed)
    }

    /// Quita el track actual y deja el cursor en el que ocupa su lugar.
    ///
    /// `Track` se trata como `Off`. Con `All`, quitar el último vuelve al
    /// principio sin pasar nada al historial: el track quitado no terminó de
    /// sonar. Devuelve el track quitado y el nuevo actual.
    pub fn remove_current(&mut self) -> Option<(Track, Option<Track>)> {
        let index = self.current?;
        let removed = self.tracks.remove(index);

        let next = if index < self.tracks.len() {
            Some(index)
        } else if self.repeat_mode == RepeatMode::All && !self.tracks.is_empty() {
            info!("🔁 Cola repetida desde el principio");
            Some(0)
        } else {
            None
        };

        match next {
            Some(next) => self.current = Some(next),
            None => self.current = index.checked_sub(1),
        }

        debug!("❌ Track actual eliminado en posición {}", index);
        Some((removed, next.and_then(|next| self.tracks.get(next).cloned())))
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    /// Mueve un track a una nueva posición sin cambiar cuál es el actual
    pub fn move_track(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return Err(PlayerError::validation("Índice fuera de rango"));
        }
        if from == to {
            return Ok(());
        }

        let current_track = self.current;
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if let Some(current) = current_track {
            self.current = Some(if current == from {
                to
            } else if from < current && to >= current {
                current - 1
            } else if from > current && to <= current {
                current + 1
            } else {
                current
            });
        }

        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(())
    }

    /// Mezcla solo los tracks que vienen después del actual
    pub fn shuffle_upcoming(&mut self) {
        let start = self.current.map_or(0, |current| current + 1);
        if start >= self.tracks.len() {
            return;
        }

        let mut rng = rand::thread_rng();
        self.tracks[start..].shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.tracks.len() - start);
    }

    /// Cambia el modo aleatorio; al activarlo se mezclan los próximos tracks
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            self.shuffle_upcoming();
            info!("🔀 Modo aleatorio activado");
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
        self.shuffle
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
    }

    /// Off -> Track -> All -> Off
    pub fn cycle_repeat_mode(&mut self) -> RepeatMode {
        let next = self.repeat_mode.next();
        self.set_repeat_mode(next);
        next
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|index| self.tracks.get(index))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Tracks que vienen después del actual
    pub fn upcoming(&self) -> &[Track] {
        let start = self.current.map_or(0, |current| current + 1).min(self.tracks.len());
        &self.tracks[start..]
    }

    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().map(Track::duration).sum()
    }

    pub fn get_info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current().cloned(),
            current_index: self.current,
            items: self.tracks.clone(),
            repeat_mode: self.repeat_mode,
            shuffle: self.shuffle,
            total_duration: self.total_duration(),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.clone(),
            current_index: self.current,
            repeat_mode: self.repeat_mode,
            shuffle: self.shuffle,
        }
    }

    /// Restaura un snapshot guardado. Lo que exceda `max_size` se descarta
    /// con un aviso y un cursor inválido se reinicia.
    pub fn restore(&mut self, snapshot: QueueSnapshot) {
        let QueueSnapshot {
            mut tracks,
            current_index,
            repeat_mode,
            shuffle,
        } = snapshot;

        if tracks.len() > self.max_size {
            warn!(
                "⚠️ Snapshot con {} canciones excede el máximo de {}, se recorta",
                tracks.len(),
                self.max_size
            );
            tracks.truncate(self.max_size);
        }

        self.current = current_index.filter(|&index| index < tracks.len());
        self.tracks = tracks;
        self.repeat_mode = repeat_mode;
        self.shuffle = shuffle;
    }

    fn push_history(&mut self, track: Track) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(track);
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub current_index: Option<usize>,
    pub items: Vec<Track>,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola (las páginas empiezan en 1)
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let safe_page = page.clamp(1, total_pages);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.items[start..end]
                .iter()
                .cloned()
                .enumerate()
                .map(|(offset, track)| (start + offset, track))
                .collect(),
            current_page: safe_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    /// (índice en la cola, track)
    pub items: Vec<(usize, Track)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
