//! Filtros de audio para FFmpeg.
//!
//! Cada filtro tiene una plantilla (`bass=g={gain}`) cuyos tokens se
//! sustituyen por los valores actuales de sus parámetros. La cadena
//! combinada es el argumento `-af` que recibe FFmpeg al crear la fuente.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

/// Separador entre fragmentos de la cadena combinada
pub const CHAIN_SEPARATOR: &str = ",";

#[derive(Debug, Clone, PartialEq)]
pub struct FilterParameter {
    name: String,
    value: f64,
    default: f64,
    min: f64,
    max: f64,
    description: String,
}

impl FilterParameter {
    pub fn new(name: &str, value: f64, min: f64, max: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            default: value,
            min,
            max,
            description: description.to_string(),
        }
    }

    /// Cambia el valor solo si está dentro de `[min, max]`
    pub fn set_value(&mut self, value: f64) -> bool {
        if self.accepts(value) {
            self.value = value;
            true
        } else {
            false
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite() && self.min <= value && value <= self.max
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value(&self) -> f64 {
        self.value
    }
    pub fn min(&self) -> f64 {
        self.min
    }
    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFilter {
    name: String,
    description: String,
    template: String,
    parameters: Vec<FilterParameter>,
    enabled: bool,
}

impl AudioFilter {
    pub fn new(name: &str, template: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            template: template.to_string(),
            parameters: Vec::new(),
            enabled: false,
        }
    }

    pub fn param(mut self, name: &str, value: f64, min: f64, max: f64, description: &str) -> Self {
        self.parameters
            .push(FilterParameter::new(name, value, min, max, description));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn template(&self) -> &str {
        &self.template
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
    pub fn parameters(&self) -> &[FilterParameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&FilterParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn parameter_mut(&mut self, name: &str) -> Option<&mut FilterParameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Comprueba que la plantilla esté bien formada y que cada token tenga parámetro
    pub fn validate(&self) -> PlayerResult<()> {
        for (index, param) in self.parameters.iter().enumerate() {
            if !(param.min <= param.max) || !param.accepts(param.value) {
                return Err(PlayerError::validation(format!(
                    "El parámetro '{}' del filtro '{}' tiene un valor inicial fuera de [{}, {}]",
                    param.name, self.name, param.min, param.max
                )));
            }
            if self.parameters[..index].iter().any(|p| p.name == param.name) {
                return Err(PlayerError::validation(format!(
                    "Parámetro '{}' duplicado en el filtro '{}'",
                    param.name, self.name
                )));
            }
        }

        for token in template_tokens(&self.template)? {
            if self.parameter(token).is_none() {
                return Err(PlayerError::validation(format!(
                    "La plantilla del filtro '{}' usa '{{{}}}' pero no existe ese parámetro",
                    self.name, token
                )));
            }
        }

        Ok(())
    }

    /// Renderiza la plantilla con los valores actuales.
    ///
    /// # Panics
    ///
    /// Si la plantilla tiene un token sin parámetro. Los filtros se validan
    /// al registrarse, así que esto indica un error de programación.
    pub fn render(&self) -> String {
        let mut rendered = String::with_capacity(self.template.len() + 16);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').unwrap_or_else(|| {
                panic!("plantilla sin cerrar en el filtro '{}'", self.name)
            });
            let token = &after[..close];
            let param = self.parameter(token).unwrap_or_else(|| {
                panic!("token '{{{}}}' sin resolver en el filtro '{}'", token, self.name)
            });
            rendered.push_str(&format_value(param.value));
            rest = &after[close + 1..];
        }

        rendered.push_str(rest);
        rendered
    }

    /// Fragmento para la cadena combinada: vacío si el filtro está desactivado
    pub fn chain_fragment(&self) -> String {
        if self.enabled {
            self.render()
        } else {
            String::new()
        }
    }

    fn reset_parameters(&mut self) {
        for param in &mut self.parameters {
            param.value = param.default;
        }
    }
}

fn template_tokens(template: &str) -> PlayerResult<Vec<&str>> {
    let mut tokens = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| PlayerError::validation(format!("Plantilla sin cerrar: '{}'", template)))?;
        let token = &after[..close];
        if token.is_empty() || token.contains('{') {
            return Err(PlayerError::validation(format!(
                "Token inválido en la plantilla '{}'",
                template
            )));
        }
        tokens.push(token);
        rest = &after[close + 1..];
    }

    Ok(tokens)
}

/// Los valores se pasan tal cual a FFmpeg: 15.0 -> "15", 1.3 -> "1.3"
fn format_value(value: f64) -> String {
    format!("{}", value)
}

/// Configuración de un filtro dentro de un preset
#[derive(Debug, Clone, PartialEq)]
pub struct PresetEntry {
    pub filter: String,
    pub enabled: bool,
    pub parameters: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPreset {
    name: String,
    description: String,
    entries: Vec<PresetEntry>,
}

impl FilterPreset {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, filter: &str, enabled: bool, parameters: &[(&str, f64)]) -> Self {
        self.entries.push(PresetEntry {
            filter: filter.to_string(),
            enabled,
            parameters: parameters
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn entries(&self) -> &[PresetEntry] {
        &self.entries
    }
}

/// Estado persistible de un filtro: activado y valores de parámetros
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub enabled: bool,
    pub parameters: BTreeMap<String, f64>,
}

/// Registro de filtros de una guild.
///
/// El orden de la cadena combinada es siempre el orden de registro.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    filters: Vec<AudioFilter>,
    index: HashMap<String, usize>,
    presets: Vec<FilterPreset>,
}

impl FilterRegistry {
    /// Registro vacío, sin filtros ni presets
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
            index: HashMap::new(),
            presets: Vec::new(),
        }
    }

    /// Registro con el catálogo de filtros y presets incorporados
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        for filter in default_filters() {
            if let Err(e) = registry.register(filter) {
                panic!("catálogo de filtros inválido: {}", e);
            }
        }
        for preset in default_presets() {
            if let Err(e) = registry.add_preset(preset) {
                panic!("catálogo de presets inválido: {}", e);
            }
        }

        registry
    }

    /// Registra un filtro nuevo al final del orden de la cadena
    pub fn register(&mut self, filter: AudioFilter) -> PlayerResult<()> {
        if self.index.contains_key(filter.name()) {
            return Err(PlayerError::validation(format!(
                "El filtro '{}' ya está registrado",
                filter.name()
            )));
        }
        filter.validate()?;

        debug!("🎛️ Filtro registrado: {}", filter.name());
        self.index.insert(filter.name().to_string(), self.filters.len());
        self.filters.push(filter);
        Ok(())
    }

    /// Agrega un preset. Se valida completo para que aplicarlo nunca quede a medias.
    pub fn add_preset(&mut self, preset: FilterPreset) -> PlayerResult<()> {
        if self.preset(preset.name()).is_some() {
            return Err(PlayerError::validation(format!(
                "El preset '{}' ya existe",
                preset.name()
            )));
        }

        for entry in preset.entries() {
            let filter = self.filter(&entry.filter).ok_or_else(|| {
                PlayerError::validation(format!(
                    "El preset '{}' usa el filtro desconocido '{}'",
                    preset.name(),
                    entry.filter
                ))
            })?;
            for (param_name, value) in &entry.parameters {
                let param = filter.parameter(param_name).ok_or_else(|| {
                    PlayerError::validation(format!(
                        "El preset '{}' usa el parámetro desconocido '{}.{}'",
                        preset.name(),
                        entry.filter,
                        param_name
                    ))
                })?;
                if !param.accepts(*value) {
                    return Err(PlayerError::validation(format!(
                        "El preset '{}' asigna {} a '{}.{}' (rango {} - {})",
                        preset.name(),
                        value,
                        entry.filter,
                        param_name,
                        param.min(),
                        param.max()
                    )));
                }
            }
        }

        self.presets.push(preset);
        Ok(())
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.filter_mut(name) {
            Some(filter) => {
                if filter.enabled != enabled {
                    filter.enabled = enabled;
                    info!(
                        "🎛️ Filtro '{}' {}",
                        name,
                        if enabled { "activado" } else { "desactivado" }
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Cambia un parámetro. Falla si el filtro o el parámetro no existen o si el valor está fuera de rango.
    pub fn set_parameter(&mut self, filter_name: &str, param_name: &str, value: f64) -> bool {
        self.filter_mut(filter_name)
            .and_then(|filter| filter.parameter_mut(param_name))
            .is_some_and(|param| param.set_value(value))
    }

    /// Cadena `-af` con los filtros activos en orden de registro; vacía si no hay ninguno
    pub fn combined_chain(&self) -> String {
        self.filters
            .iter()
            .filter(|f| f.enabled)
            .map(AudioFilter::render)
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join(CHAIN_SEPARATOR)
    }

    /// Aplica un preset: primero se desactiva todo y luego se configura el preset
    pub fn apply_preset(&mut self, name: &str) -> bool {
        let Some(preset) = self.preset(name).cloned() else {
            return false;
        };

        for filter in &mut self.filters {
            filter.enabled = false;
        }

        for entry in preset.entries() {
            if let Some(filter) = self.filter_mut(&entry.filter) {
                filter.enabled = entry.enabled;
                for (param_name, value) in &entry.parameters {
                    if let Some(param) = filter.parameter_mut(param_name) {
                        param.set_value(*value);
                    }
                }
            }
        }

        info!("🎛️ Preset '{}' aplicado", name);
        true
    }

    /// Desactiva todos los filtros y restaura los valores por defecto
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.enabled = false;
            filter.reset_parameters();
        }
        info!("🔄 Filtros reseteados");
    }

    // Variantes con error descriptivo para los comandos

    pub fn try_enable(&mut self, name: &str) -> PlayerResult<()> {
        if self.enable(name) {
            Ok(())
        } else {
            Err(self.unknown_filter(name))
        }
    }

    pub fn try_disable(&mut self, name: &str) -> PlayerResult<()> {
        if self.disable(name) {
            Ok(())
        } else {
            Err(self.unknown_filter(name))
        }
    }

    pub fn try_set_parameter(
        &mut self,
        filter_name: &str,
        param_name: &str,
        value: f64,
    ) -> PlayerResult<()> {
        let filter = self
            .filter(filter_name)
            .ok_or_else(|| self.unknown_filter(filter_name))?;
        let param = filter.parameter(param_name).ok_or_else(|| {
            let available: Vec<&str> = filter.parameters().iter().map(|p| p.name()).collect();
            PlayerError::validation(format!(
                "El filtro '{}' no tiene el parámetro '{}' (disponibles: {})",
                filter_name,
                param_name,
                available.join(", ")
            ))
        })?;
        if !param.accepts(value) {
            return Err(PlayerError::validation(format!(
                "'{}' debe estar entre {} y {}",
                param_name,
                param.min(),
                param.max()
            )));
        }

        self.set_parameter(filter_name, param_name, value);
        debug!("🎚️ {}.{} = {}", filter_name, param_name, value);
        Ok(())
    }

    pub fn try_apply_preset(&mut self, name: &str) -> PlayerResult<()> {
        if self.apply_preset(name) {
            Ok(())
        } else {
            Err(PlayerError::validation(format!(
                "Preset '{}' no encontrado (disponibles: {})",
                name,
                self.preset_names().join(", ")
            )))
        }
    }

    fn unknown_filter(&self, name: &str) -> PlayerError {
        PlayerError::validation(format!(
            "Filtro '{}' no encontrado (disponibles: {})",
            name,
            self.filter_names().join(", ")
        ))
    }

    pub fn filter(&self, name: &str) -> Option<&AudioFilter> {
        self.index.get(name).map(|&i| &self.filters[i])
    }

    fn filter_mut(&mut self, name: &str) -> Option<&mut AudioFilter> {
        let index = *self.index.get(name)?;
        self.filters.get_mut(index)
    }

    pub fn preset(&self, name: &str) -> Option<&FilterPreset> {
        self.presets.iter().find(|p| p.name() == name)
    }

    pub fn filters(&self) -> &[AudioFilter] {
        &self.filters
    }

    pub fn enabled_filters(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|f| f.enabled)
            .map(AudioFilter::name)
            .collect()
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(AudioFilter::name).collect()
    }

    pub fn preset_names(&self) -> Vec<&str> {
        self.presets.iter().map(FilterPreset::name).collect()
    }

    /// Estado de cada filtro (activado + parámetros) para persistir
    pub fn snapshot(&self) -> BTreeMap<String, FilterState> {
        self.filters
            .iter()
            .map(|filter| {
                let state = FilterState {
                    enabled: filter.enabled,
                    parameters: filter
                        .parameters
                        .iter()
                        .map(|p| (p.name.clone(), p.value))
                        .collect(),
                };
                (filter.name.clone(), state)
            })
            .collect()
    }

    /// Restaura un estado guardado. Filtros o parámetros desconocidos y valores
    /// fuera de rango se ignoran con un aviso.
    pub fn restore(&mut self, states: &BTreeMap<String, FilterState>) {
        for (name, state) in states {
            let Some(filter) = self.filter_mut(name) else {
                warn!("⚠️ Filtro guardado desconocido, se ignora: {}", name);
                continue;
            };
            filter.enabled = state.enabled;
            for (param_name, value) in &state.parameters {
                let applied = filter
                    .parameter_mut(param_name)
                    .is_some_and(|param| param.set_value(*value));
                if !applied {
                    warn!(
                        "⚠️ Valor guardado inválido para {}.{} = {}, se ignora",
                        name, param_name, value
                    );
                }
            }
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_filters() -> Vec<AudioFilter> {
    vec![
        AudioFilter::new(
            "bass_boost",
            "bass=g={gain},dynaudnorm=f={frequency}",
            "Realza las frecuencias bajas",
        )
        .param("gain", 15.0, 0.0, 30.0, "Ganancia de graves en dB")
        .param("frequency", 200.0, 100.0, 500.0, "Ventana de normalización dinámica"),
        AudioFilter::new(
            "nightcore",
            "atempo={tempo},asetrate=44100*{pitch_factor},bass=g={bass_gain}",
            "Acelera y sube el tono",
        )
        .param("tempo", 1.3, 1.0, 2.0, "Multiplicador de velocidad")
        .param("pitch_factor", 1.3, 1.0, 2.0, "Factor de tono")
        .param("bass_gain", 5.0, 0.0, 15.0, "Compensación de graves en dB"),
        AudioFilter::new(
            "slowed",
            "atempo={tempo},aecho={in_gain}:{out_gain}:{delay}:{decay}",
            "Ralentiza con reverberación",
        )
        .param("tempo", 0.8, 0.5, 1.0, "Velocidad de reproducción")
        .param("in_gain", 0.8, 0.1, 1.0, "Ganancia de entrada")
        .param("out_gain", 0.9, 0.1, 1.0, "Ganancia de salida")
        .param("delay", 1000.0, 100.0, 2000.0, "Retardo del eco en ms")
        .param("decay", 0.3, 0.1, 0.9, "Decaimiento del eco"),
        AudioFilter::new("8d", "apulsator=hz={frequency}", "Efecto envolvente 8D")
            .param("frequency", 0.2, 0.1, 2.0, "Frecuencia de pulsación en Hz"),
        AudioFilter::new(
            "equalizer",
            "equalizer=f={freq1}:t=h:w={width1}:g={gain1},equalizer=f={freq2}:t=h:w={width2}:g={gain2},equalizer=f={freq3}:t=h:w={width3}:g={gain3}",
            "Ecualizador de 3 bandas",
        )
        .param("freq1", 100.0, 20.0, 500.0, "Centro de graves en Hz")
        .param("gain1", 0.0, -20.0, 20.0, "Ganancia de graves en dB")
        .param("width1", 50.0, 10.0, 200.0, "Ancho de graves en Hz")
        .param("freq2", 1000.0, 500.0, 5000.0, "Centro de medios en Hz")
        .param("gain2", 0.0, -20.0, 20.0, "Ganancia de medios en dB")
        .param("width2", 100.0, 10.0, 500.0, "Ancho de medios en Hz")
        .param("freq3", 8000.0, 2000.0, 20000.0, "Centro de agudos en Hz")
        .param("gain3", 0.0, -20.0, 20.0, "Ganancia de agudos en dB")
        .param("width3", 200.0, 10.0, 1000.0, "Ancho de agudos en Hz"),
        AudioFilter::new(
            "overdrive",
            "volume={drive}dB,alimiter=level_in={level_in}:level_out={level_out}:limit={limit}:attack=5:release=50,volume={output}dB",
            "Saturación cálida tipo válvula",
        )
        .param("drive", 12.0, 3.0, 30.0, "Saturación en dB")
        .param("level_in", 1.0, 0.5, 2.0, "Multiplicador de entrada")
        .param("level_out", 0.8, 0.3, 1.0, "Multiplicador de salida")
        .param("limit", 0.9, 0.5, 0.98, "Umbral del limitador")
        .param("output", -3.0, -10.0, 3.0, "Ganancia final en dB"),
        AudioFilter::new(
            "compressor",
            "acompressor=threshold={threshold}:ratio={ratio}:attack={attack}:release={release}",
            "Compresión de rango dinámico",
        )
        .param("threshold", 0.5, 0.1, 1.0, "Umbral de compresión")
        .param("ratio", 4.0, 1.0, 20.0, "Ratio de compresión")
        .param("attack", 5.0, 1.0, 100.0, "Ataque en ms")
        .param("release", 50.0, 10.0, 1000.0, "Liberación en ms"),
        AudioFilter::new(
            "vaporwave",
            "atempo={tempo},asetrate=44100*{pitch_factor}",
            "Lento y con el tono bajado",
        )
        .param("tempo", 0.8, 0.5, 1.0, "Multiplicador de velocidad")
        .param("pitch_factor", 0.9, 0.5, 1.0, "Factor de tono"),
    ]
}

fn default_presets() -> Vec<FilterPreset> {
    vec![
        FilterPreset::new("gaming", "Optimizado para audio de juegos")
            .with(
                "compressor",
                true,
                &[("threshold", 0.3), ("ratio", 6.0), ("attack", 2.0), ("release", 30.0)],
            )
            .with(
                "equalizer",
                true,
                &[("freq2", 2000.0), ("gain2", 3.0), ("freq3", 6000.0), ("gain3", 2.0)],
            ),
        FilterPreset::new("music", "Escucha de música mejorada")
            .with("bass_boost", true, &[("gain", 8.0), ("frequency", 150.0)])
            .with(
                "equalizer",
                true,
                &[("freq1", 80.0), ("gain1", 2.0), ("freq3", 12000.0), ("gain3", 1.0)],
            ),
        FilterPreset::new("vocal", "Optimizado para voz y podcasts")
            .with(
                "compressor",
                true,
                &[("threshold", 0.6), ("ratio", 3.0), ("attack", 1.0), ("release", 100.0)],
            )
            .with(
                "equalizer",
                true,
                &[("freq2", 1500.0), ("gain2", 4.0), ("width2", 200.0)],
            ),
    ]
}
