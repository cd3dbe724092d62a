//! # Bot Module
//!
//! Capa de Discord: registra los comandos slash, gestiona las conexiones de
//! voz y traduce cada comando a una operación del [`GuildPlayer`] de la
//! guild. También reenvía al canal de texto los avisos que emite el
//! reproductor (track iniciado, track saltado por error, cola terminada).
//!
//! [`GuildPlayer`]: crate::audio::player::GuildPlayer

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Http, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        events::PlayerEvent, ffmpeg::SongbirdAdapter, manager::PlayerManager,
        player::GuildPlayer,
    },
    config::Config,
    sources::TrackResolver,
    storage::JsonStorage,
};

pub struct GuildTunesBot {
    config: Arc<Config>,
    pub players: Arc<PlayerManager>,
    pub resolver: Arc<dyn TrackResolver>,
    storage: Arc<JsonStorage>,
    /// Conexiones de voz por guild
    voice_handlers: DashMap<GuildId, Arc<tokio::sync::Mutex<songbird::Call>>>,
    /// Último canal de texto donde se usó un comando, para los avisos
    announce_channels: Arc<DashMap<u64, ChannelId>>,
    /// Se entrega a la tarea de avisos en el primer `ready`
    events: parking_lot::Mutex<Option<flume::Receiver<PlayerEvent>>>,
}

impl GuildTunesBot {
    pub fn new(
        config: Config,
        players: Arc<PlayerManager>,
        resolver: Arc<dyn TrackResolver>,
        storage: Arc<JsonStorage>,
        events: flume::Receiver<PlayerEvent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            players,
            resolver,
            storage,
            voice_handlers: DashMap::new(),
            announce_channels: Arc::new(DashMap::new()),
            events: parking_lot::Mutex::new(Some(events)),
        }
    }

    /// Registra los comandos slash globalmente o en la guild de desarrollo
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot a un canal de voz
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<tokio::sync::Mutex<songbird::Call>>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                self.voice_handlers.insert(guild_id, call.clone());
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(call)
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Detiene la reproducción, guarda el estado y sale del canal de voz
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        self.players.teardown(guild_id.get()).await;
        self.voice_handlers.remove(&guild_id);

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
        manager.remove(guild_id).await?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    pub fn get_voice_handler(
        &self,
        guild_id: GuildId,
    ) -> Option<Arc<tokio::sync::Mutex<songbird::Call>>> {
        self.voice_handlers.get(&guild_id).map(|h| h.clone())
    }

    /// Reproductor de una guild ya conectada
    pub fn player(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(guild_id.get())
    }

    /// Reproductor de la guild; lo crea sobre la conexión de voz actual
    pub async fn player_for_call(
        &self,
        guild_id: GuildId,
        call: Arc<tokio::sync::Mutex<songbird::Call>>,
    ) -> Arc<GuildPlayer> {
        let adapter = Arc::new(SongbirdAdapter::new(
            call,
            self.config.ffmpeg_path.clone(),
            self.config.ytdlp_path.clone(),
        ));
        self.players.get_or_create(guild_id.get(), adapter).await
    }

    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id.get(), channel_id);
    }

    pub async fn persist(&self, guild_id: GuildId) {
        self.players.persist(guild_id.get()).await;
    }
}

#[async_trait]
impl EventHandler for GuildTunesBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let active: Vec<u64> = ready.guilds.iter().map(|guild| guild.id.get()).collect();
        match self.storage.cleanup_inactive(&active).await {
            Ok(0) => {}
            Ok(removed) => info!("🧹 Eliminados {} estados de guilds abandonadas", removed),
            Err(e) => warn!("Error limpiando estados guardados: {:?}", e),
        }

        // Tras una reconexión `ready` se repite; la tarea de avisos ya existe
        if let Some(events) = self.events.lock().take() {
            let http = ctx.http.clone();
            let channels = self.announce_channels.clone();
            tokio::spawn(async move {
                relay_player_events(http, events, channels).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si el bot fue desconectado del canal de voz, se libera la guild
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.voice_handlers.remove(&guild_id);
            self.players.teardown(guild_id.get()).await;
        }
    }
}

/// Envía los avisos del reproductor al canal de texto de cada guild
async fn relay_player_events(
    http: Arc<Http>,
    events: flume::Receiver<PlayerEvent>,
    channels: Arc<DashMap<u64, ChannelId>>,
) {
    while let Ok(event) = events.recv_async().await {
        let Some(channel_id) = channels.get(&event.guild_id).map(|entry| *entry) else {
            debug!("Sin canal de avisos para guild {}", event.guild_id);
            continue;
        };

        if let Err(e) = channel_id.say(&*http, event.describe()).await {
            warn!("No se pudo enviar aviso a guild {}: {:?}", event.guild_id, e);
        }
    }

    info!("📭 Canal de eventos del reproductor cerrado");
}
