use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    filters::FilterRegistry,
    queue::{QueueInfo, RepeatMode},
    track::{format_duration, SourceKind, Track},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Tunes";
const ITEMS_PER_PAGE: usize = 10;

fn source_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::VideoHost => "Video",
        SourceKind::ExternalPlaylist => "Playlist",
        SourceKind::Local => "Archivo",
    }
}

fn duration_label(track: &Track) -> String {
    if track.duration_secs() == 0 {
        "🔴 En vivo".to_string()
    } else {
        track.duration_formatted()
    }
}

fn track_fields(embed: CreateEmbed, track: &Track) -> CreateEmbed {
    let mut embed = embed
        .field("🎤 Artista", track.artist().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration_label(track), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requester_id()), true)
        .field("🔗 Fuente", source_label(track.source_kind()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }
    if track.stream_ref().starts_with("http") {
        embed = embed.url(track.stream_ref());
    }
    embed
}

pub fn create_now_playing_embed(
    track: &Track,
    paused: bool,
    volume: f32,
    filters: &[String],
) -> CreateEmbed {
    let title = if paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    let filters = if filters.is_empty() {
        "Ninguno".to_string()
    } else {
        filters.join(", ")
    };

    track_fields(embed, track)
        .field("🔊 Volumen", format!("{}%", (volume * 100.0).round() as u32), true)
        .field("🎛️ Filtros", filters, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se agregó a la cola en la posición {}",
            track.title(),
            position + 1
        ))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

pub fn create_playlist_added_embed(added: usize, requested: usize) -> CreateEmbed {
    let mut description = format!("Se agregaron **{}** canciones a la cola", added);
    if added < requested {
        description.push_str(&format!(
            "\n⚠️ {} no entraron porque la cola está llena",
            requested - added
        ));
    }

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, ITEMS_PER_PAGE);

    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    for (index, item) in &queue_page.items {
        let marker = if Some(*index) == queue_info.current_index {
            "▶️ "
        } else {
            ""
        };
        description.push_str(&format!(
            "{}**{}**. {} `[{}]`\n",
            marker,
            index + 1,
            item.display_title(),
            item.duration_formatted()
        ));
    }
    let mut embed = embed.description(description);

    let repeat = match queue_info.repeat_mode {
        RepeatMode::Track => "🔂 Canción",
        RepeatMode::All => "🔁 Cola",
        RepeatMode::Off => "➡️ Sin repetición",
    };
    let mut info = format!(
        "**Total:** {} canciones • **Duración:** {} • {}",
        queue_page.total_items,
        format_duration(queue_info.total_duration.as_secs()),
        repeat
    );
    if queue_info.shuffle {
        info.push_str(" • 🔀 **Aleatorio**");
    }
    embed = embed.field("Información", info, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Guild Tunes",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Estado de filtros y presets disponibles
pub fn create_filters_embed(registry: &FilterRegistry) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎛️ Filtros de Audio")
        .color(colors::MUSIC_PURPLE);

    for filter in registry.filters() {
        let status = if filter.is_enabled() { "🟢" } else { "⚪" };
        let params = filter
            .parameters()
            .iter()
            .map(|param| format!("`{}={}`", param.name(), param.value()))
            .collect::<Vec<_>>()
            .join(" ");
        embed = embed.field(
            format!("{} {}", status, filter.name()),
            format!("{}\n{}", filter.description(), params),
            false,
        );
    }

    let presets = registry
        .preset_names()
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ");

    embed
        .field("🎚️ Presets", presets, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
