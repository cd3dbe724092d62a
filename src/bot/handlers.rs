use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        filters::FilterRegistry,
        player::{GuildPlayer, PlaybackStatus},
        queue::{MusicQueue, RepeatMode},
    },
    bot::GuildTunesBot,
    error::PlayerError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GuildTunesBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );
    bot.remember_channel(guild_id, command.channel_id);

    let result = match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await,
        "move" => handle_move(ctx, &command, bot, guild_id).await,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await,
        "filter" => handle_filter(ctx, &command, bot, guild_id).await,
        "filterparam" => handle_filterparam(ctx, &command, bot, guild_id).await,
        "preset" => handle_preset(ctx, &command, bot, guild_id).await,
        "filters" => handle_filters(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await,
    };

    // Los errores del reproductor se muestran al usuario, no solo en logs
    if let Err(e) = result {
        warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
        reply_embed(
            ctx,
            &command,
            embeds::create_error_embed("No se pudo completar", &e.to_string()),
            true,
        )
        .await?;
    }

    Ok(())
}

// Helpers de respuesta

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

// Lectura de opciones

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_f64(command: &CommandInteraction, name: &str) -> Option<f64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_f64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

/// Reproductor de la guild; sin conexión de voz no hay nada que controlar
fn require_player(bot: &GuildTunesBot, guild_id: GuildId) -> Result<Arc<GuildPlayer>> {
    bot.player(guild_id)
        .ok_or_else(|| anyhow::anyhow!("No estoy conectado a un canal de voz. Usa `/play` primero"))
}

async fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Reaplica la cadena de filtros si hay algo sonando y guarda el estado.
/// El cambio de filtros se conserva aunque el track actual no se pueda reiniciar.
async fn apply_live(bot: &GuildTunesBot, guild_id: GuildId, player: &GuildPlayer) -> Result<()> {
    let restarted = player.reapply_if_active().await;
    bot.persist(guild_id).await;

    match restarted {
        Ok(_) => Ok(()),
        Err(PlayerError::ConcurrencyConflict) => Err(PlayerError::ConcurrencyConflict.into()),
        Err(e) => Err(anyhow::anyhow!(
            "Los filtros se guardaron, pero la canción actual no se pudo reiniciar y se quitó de la cola ({})",
            e
        )),
    }
}

// Reproducción

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match play_query(ctx, command, bot, guild_id, &query).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /play '{}' falló en guild {}: {}", query, guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn play_query(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
    query: &str,
) -> Result<CreateEmbed> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id).await?;

    let call = match bot.get_voice_handler(guild_id) {
        Some(call) => call,
        None => bot.join_voice_channel(ctx, guild_id, voice_channel_id).await?,
    };

    let mut tracks = bot.resolver.resolve(query, command.user.id.get()).await?;
    let player = bot.player_for_call(guild_id, call).await;

    let embed = if tracks.len() == 1 {
        let track = tracks.remove(0);
        let enqueued = player.enqueue(track.clone()).await?;
        match enqueued.started {
            Some(started) => embeds::create_now_playing_embed(
                &started,
                false,
                player.volume().await,
                &player.enabled_filters().await,
            ),
            None => embeds::create_track_added_embed(&track, enqueued.position),
        }
    } else {
        let requested = tracks.len();
        let enqueued = player.enqueue_many(tracks).await?;
        embeds::create_playlist_added_embed(enqueued.added, requested)
    };

    bot.persist(guild_id).await;
    Ok(embed)
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    require_player(bot, guild_id)?.pause().await?;
    reply(ctx, command, "⏸️ Reproducción pausada", false).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    require_player(bot, guild_id)?.resume().await?;
    reply(ctx, command, "▶️ Reproducción reanudada", false).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = require_player(bot, guild_id)?;
    let next = player.skip().await?;
    bot.persist(guild_id).await;

    let content = match next {
        Some(track) => format!("⏭️ Saltado. Ahora suena: **{}**", track.title()),
        None => "⏭️ Saltado. No quedan canciones en la cola".to_string(),
    };
    reply(ctx, command, content, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(player) = bot.player(guild_id) {
        player.stop().await;
    }
    if bot.get_voice_handler(guild_id).is_some() {
        bot.leave_voice_channel(ctx, guild_id).await?;
    }
    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

// Cola

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = option_i64(command, "page").unwrap_or(1).max(1) as usize;

    let queue_info = match bot.player(guild_id) {
        Some(player) => player.queue_info().await,
        None => MusicQueue::new(1).get_info(),
    };

    reply_embed(ctx, command, embeds::create_queue_embed(&queue_info, page), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.player(guild_id) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    match player.now_playing().await {
        Some(track) => {
            let paused = player.status().await == PlaybackStatus::Paused;
            let embed = embeds::create_now_playing_embed(
                &track,
                paused,
                player.volume().await,
                &player.enabled_filters().await,
            );
            reply_embed(ctx, command, embed, false).await
        }
        None => reply(ctx, command, "❌ No hay nada reproduciéndose", true).await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = option_i64(command, "position")
        .filter(|position| *position >= 1)
        .ok_or_else(|| PlayerError::validation("La posición debe ser mayor que 0"))?;

    let player = require_player(bot, guild_id)?;
    let removed = player.remove(position as usize - 1).await?;
    bot.persist(guild_id).await;

    reply(
        ctx,
        command,
        format!("🗑️ Quitada de la cola: **{}**", removed.title()),
        false,
    )
    .await
}

async fn handle_move(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let from = option_i64(command, "from")
        .ok_or_else(|| PlayerError::validation("Falta la posición de origen"))?;
    let to = option_i64(command, "to")
        .ok_or_else(|| PlayerError::validation("Falta la posición de destino"))?;
    if from < 1 || to < 1 {
        return Err(PlayerError::validation("Las posiciones empiezan en 1").into());
    }

    require_player(bot, guild_id)?
        .move_track(from as usize - 1, to as usize - 1)
        .await?;
    bot.persist(guild_id).await;

    reply(
        ctx,
        command,
        format!("📍 Canción movida de la posición {} a la {}", from, to),
        false,
    )
    .await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let enabled = require_player(bot, guild_id)?.toggle_shuffle().await?;
    bot.persist(guild_id).await;

    let content = if enabled {
        "🔀 Modo aleatorio activado"
    } else {
        "➡️ Modo aleatorio desactivado"
    };
    reply(ctx, command, content, false).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = require_player(bot, guild_id)?;

    let mode = match option_str(command, "mode") {
        Some(value) => {
            let mode = RepeatMode::parse(value)
                .ok_or_else(|| PlayerError::validation(format!("Modo de repetición desconocido: {}", value)))?;
            player.set_repeat_mode(mode).await?;
            mode
        }
        None => player.cycle_repeat_mode().await?,
    };
    bot.persist(guild_id).await;

    reply(ctx, command, format!("🔁 Repetición: **{}**", mode.label()), false).await
}

// Audio

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = require_player(bot, guild_id)?;

    let Some(level) = option_i64(command, "level") else {
        let current = (player.volume().await * 100.0).round() as u32;
        return reply(ctx, command, format!("🔊 Volumen actual: **{}%**", current), false).await;
    };

    player.set_volume(level as f32 / 100.0).await?;
    bot.persist(guild_id).await;

    reply(ctx, command, format!("🔊 Volumen ajustado a **{}%**", level), false).await
}

async fn handle_filter(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let name = option_str(command, "name")
        .ok_or_else(|| PlayerError::validation("Falta el nombre del filtro"))?;
    let enabled = option_bool(command, "enabled").unwrap_or(true);

    let player = require_player(bot, guild_id)?;
    if enabled {
        player.enable_filter(name).await?;
    } else {
        player.disable_filter(name).await?;
    }
    apply_live(bot, guild_id, &player).await?;

    let content = if enabled {
        format!("🎛️ Filtro **{}** activado", name)
    } else {
        format!("🎛️ Filtro **{}** desactivado", name)
    };
    reply(ctx, command, content, false).await
}

async fn handle_filterparam(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let filter = option_str(command, "filter")
        .ok_or_else(|| PlayerError::validation("Falta el nombre del filtro"))?;
    let param = option_str(command, "param")
        .ok_or_else(|| PlayerError::validation("Falta el parámetro"))?;
    let value = option_f64(command, "value")
        .ok_or_else(|| PlayerError::validation("Falta el valor"))?;

    let player = require_player(bot, guild_id)?;
    player.set_filter_parameter(filter, param, value).await?;
    apply_live(bot, guild_id, &player).await?;

    reply(
        ctx,
        command,
        format!("🎚️ **{}**: `{}` = {}", filter, param, value),
        false,
    )
    .await
}

async fn handle_preset(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let name = option_str(command, "name")
        .ok_or_else(|| PlayerError::validation("Falta el nombre del preset"))?;

    let player = require_player(bot, guild_id)?;
    if name == "reset" {
        player.reset_filters().await?;
    } else {
        player.apply_preset(name).await?;
    }
    apply_live(bot, guild_id, &player).await?;

    let content = if name == "reset" {
        "🎛️ Filtros desactivados".to_string()
    } else {
        format!("🎛️ Preset **{}** aplicado", name)
    };
    reply(ctx, command, content, false).await
}

async fn handle_filters(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.player(guild_id) {
        Some(player) => player.with_filters(embeds::create_filters_embed).await,
        None => embeds::create_filters_embed(&FilterRegistry::with_defaults()),
    };

    reply_embed(ctx, command, embed, true).await
}

// Conexión

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTunesBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.get_voice_handler(guild_id).is_none() {
        return reply(ctx, command, "❌ No estoy en un canal de voz", true).await;
    }

    bot.leave_voice_channel(ctx, guild_id).await?;
    reply(ctx, command, "👋 Desconectado del canal de voz", false).await
}
