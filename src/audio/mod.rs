//! # Audio Module
//!
//! Núcleo de reproducción por guild: cola, filtros, volumen y la máquina de
//! estados que coordina la fuente de audio en vivo.
//!
//! ## Componentes
//!
//! - [`player`]: `GuildPlayer`, transiciones Idle/Playing/Paused y
//!   reaplicación de filtros sobre el track actual
//! - [`queue`]: cola con cursor, historial y modos de repetición/aleatorio
//! - [`filters`]: registro de filtros ffmpeg y presets
//! - [`media`]: contrato con el backend de audio (`MediaAdapter`)
//! - [`ffmpeg`]: backend real sobre songbird + ffmpeg/yt-dlp
//! - [`manager`]: un `GuildPlayer` por guild, con persistencia
//!
//! Los avisos para el canal de texto salen por [`events`].

pub mod events;
pub mod ffmpeg;
pub mod filters;
pub mod manager;
pub mod media;
pub mod player;
pub mod queue;
pub mod track;

#[cfg(test)]
pub mod testing;
