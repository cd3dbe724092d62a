use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::filters::FilterRegistry;

fn all_commands() -> Vec<CreateCommand> {
    let registry = FilterRegistry::with_defaults();

    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        remove_command(),
        move_command(),
        shuffle_command(),
        loop_command(),
        volume_command(),
        filter_command(&registry),
        filterparam_command(&registry),
        preset_command(&registry),
        filters_command(),
        leave_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición en la cola (ver /queue)",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción a otra posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Activa/desactiva el modo aleatorio")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición (sin opción, cambia al siguiente)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "all"),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-200)",
            )
            .min_int_value(0)
            .max_int_value(200),
        )
}

fn filter_name_option(registry: &FilterRegistry, name: &str, description: &str) -> CreateCommandOption {
    registry
        .filter_names()
        .into_iter()
        .fold(
            CreateCommandOption::new(CommandOptionType::String, name, description).required(true),
            |option, filter| option.add_string_choice(filter, filter),
        )
}

fn filter_command(registry: &FilterRegistry) -> CreateCommand {
    CreateCommand::new("filter")
        .description("Activa o desactiva un filtro de audio")
        .add_option(filter_name_option(registry, "name", "Filtro"))
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Activar o desactivar")
                .required(true),
        )
}

fn filterparam_command(registry: &FilterRegistry) -> CreateCommand {
    CreateCommand::new("filterparam")
        .description("Cambia un parámetro de un filtro")
        .add_option(filter_name_option(registry, "filter", "Filtro"))
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "param", "Parámetro (ver /filters)")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "value", "Nuevo valor")
                .required(true),
        )
}

fn preset_command(registry: &FilterRegistry) -> CreateCommand {
    let option = registry.preset_names().into_iter().fold(
        CreateCommandOption::new(CommandOptionType::String, "name", "Preset").required(true),
        |option, preset| option.add_string_choice(preset, preset),
    );

    CreateCommand::new("preset")
        .description("Aplica un preset de filtros")
        .add_option(option.add_string_choice("Sin filtros", "reset"))
}

fn filters_command() -> CreateCommand {
    CreateCommand::new("filters").description("Muestra los filtros y presets disponibles")
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}
