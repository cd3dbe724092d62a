use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        events::PlayerEvent,
        media::MediaAdapter,
        player::{GuildPlayer, PlayerSettings},
    },
    storage::GuildStore,
};

/// Registro de coordinadores activos, uno por guild
pub struct PlayerManager {
    players: DashMap<u64, Arc<GuildPlayer>>,
    settings: PlayerSettings,
    store: Arc<dyn GuildStore>,
    events: flume::Sender<PlayerEvent>,
}

impl PlayerManager {
    pub fn new(
        settings: PlayerSettings,
        store: Arc<dyn GuildStore>,
        events: flume::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            players: DashMap::new(),
            settings,
            store,
            events,
        }
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Devuelve el coordinador de la guild, creándolo (y cargando su estado
    /// guardado) si todavía no existe.
    pub async fn get_or_create(
        &self,
        guild_id: u64,
        adapter: Arc<dyn MediaAdapter>,
    ) -> Arc<GuildPlayer> {
        if let Some(player) = self.get(guild_id) {
            return player;
        }

        let player = GuildPlayer::new(
            guild_id,
            adapter,
            self.settings.clone(),
            self.events.clone(),
        );
        match self.store.load_guild_state(guild_id).await {
            Ok(Some(snapshot)) => player.restore(snapshot).await,
            Ok(None) => {}
            Err(e) => warn!("⚠️ No se pudo cargar el estado de guild {}: {}", guild_id, e),
        }

        // Si otra tarea lo creó mientras tanto, gana el primero
        let player = self
            .players
            .entry(guild_id)
            .or_insert(player)
            .value()
            .clone();
        info!("🎧 Reproductor listo para guild {}", guild_id);
        player
    }

    /// Guarda el estado actual de la guild
    pub async fn persist(&self, guild_id: u64) {
        let Some(player) = self.get(guild_id) else {
            return;
        };
        let snapshot = player.snapshot().await;
        if let Err(e) = self.store.save_guild_state(guild_id, snapshot).await {
            warn!("⚠️ No se pudo guardar el estado de guild {}: {}", guild_id, e);
        }
    }

    /// Detiene la reproducción, guarda el estado y descarta el coordinador
    pub async fn teardown(&self, guild_id: u64) {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return;
        };

        player.stop().await;
        let snapshot = player.snapshot().await;
        if let Err(e) = self.store.save_guild_state(guild_id, snapshot).await {
            warn!("⚠️ No se pudo guardar el estado de guild {}: {}", guild_id, e);
        }
        info!("👋 Reproductor liberado para guild {}", guild_id);
    }

    pub fn active_guilds(&self) -> Vec<u64> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    /// Detiene todas las guilds (apagado)
    pub async fn shutdown(&self) {
        for guild_id in self.active_guilds() {
            self.teardown(guild_id).await;
        }
    }
}
