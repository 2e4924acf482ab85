//! Module with patient display settings, as stored by the portal under `patient_display`
use std::{fmt, str::FromStr};

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_ROTATE_MS: u64 = 12000;
pub const MIN_ROTATE_MS: u64 = 3000;
pub const MAX_ROTATE_MS: u64 = 300000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    Flat,
    Profile,
    ExclusiveMultirow,
    PerSpecialty,
    #[default]
    Grouped,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "flat" => Ok(DisplayMode::Flat),
            "profile" => Ok(DisplayMode::Profile),
            "exclusive-multirow" => Ok(DisplayMode::ExclusiveMultirow),
            "per-specialty" => Ok(DisplayMode::PerSpecialty),
            "grouped" => Ok(DisplayMode::Grouped),
            other => Err(format!("unknown display mode {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    Cover,
    Contain,
    #[default]
    Auto,
}

impl FillMode {
    /// Anything the portal does not know about falls back to `auto`, as the server does.
    pub fn parse_lenient(s: &str) -> FillMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => FillMode::Cover,
            "contain" => FillMode::Contain,
            _ => FillMode::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::Cover => "cover",
            FillMode::Contain => "contain",
            FillMode::Auto => "auto",
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective display settings with every option resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySettings {
    pub rotate_ms: u64,
    pub show_start_time: bool,
    pub show_room: bool,
    pub show_breaks: bool,
    pub mode: DisplayMode,
    pub fill_mode: FillMode,
    pub display_resolution: Option<String>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            rotate_ms: DEFAULT_ROTATE_MS,
            show_start_time: true,
            show_room: true,
            show_breaks: true,
            mode: DisplayMode::default(),
            fill_mode: FillMode::default(),
            display_resolution: None,
        }
    }
}

/// Partial settings as sent in the bootstrap and in `patient_display_settings` pushes.
/// Keys that are not listed here are ignored.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SettingsPatch {
    #[serde(default, deserialize_with = "de_opt_millis")]
    pub rotate_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub show_start_time: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub show_room: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub show_breaks: Option<bool>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fill_mode: Option<String>,
    #[serde(default)]
    pub display_resolution: Option<String>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub flat_mode: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub per_specialty_slides: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub exclusive_multirow_specialty: Option<bool>,
}

impl SettingsPatch {
    /// Mode requested by this patch. An explicit `mode` wins over the legacy flags.
    fn requested_mode(&self) -> Option<DisplayMode> {
        if let Some(mode) = &self.mode {
            match mode.parse() {
                Ok(mode) => return Some(mode),
                Err(e) => warn!("Ignoring display mode: {}", e),
            }
        }
        if self.flat_mode == Some(true) {
            Some(DisplayMode::Flat)
        } else if self.per_specialty_slides == Some(true) {
            Some(DisplayMode::PerSpecialty)
        } else if self.exclusive_multirow_specialty == Some(true) {
            Some(DisplayMode::ExclusiveMultirow)
        } else if self.mode.is_none()
            && (self.flat_mode.is_some()
                || self.per_specialty_slides.is_some()
                || self.exclusive_multirow_specialty.is_some())
        {
            /* all legacy flags explicitly off */
            Some(DisplayMode::Grouped)
        } else {
            None
        }
    }
}

impl DisplaySettings {
    pub fn from_patch(patch: &SettingsPatch) -> Self {
        let mut settings = DisplaySettings::default();
        settings.apply(patch);
        settings
    }

    /// Merges a patch in place. Returns true when `rotate_ms` changed.
    pub fn apply(&mut self, patch: &SettingsPatch) -> bool {
        let old_rotate_ms = self.rotate_ms;
        if let Some(rotate_ms) = patch.rotate_ms {
            self.rotate_ms = rotate_ms.clamp(MIN_ROTATE_MS, MAX_ROTATE_MS);
        }
        if let Some(show) = patch.show_start_time {
            self.show_start_time = show;
        }
        if let Some(show) = patch.show_room {
            self.show_room = show;
        }
        if let Some(show) = patch.show_breaks {
            self.show_breaks = show;
        }
        if let Some(mode) = patch.requested_mode() {
            self.mode = mode;
        }
        if let Some(fill_mode) = &patch.fill_mode {
            self.fill_mode = FillMode::parse_lenient(fill_mode);
        }
        if let Some(resolution) = &patch.display_resolution {
            self.display_resolution = Some(resolution.clone());
        }
        debug!("Display settings now {:?}", self);
        old_rotate_ms != self.rotate_ms
    }
}

fn de_opt_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0),
        Some(Value::String(s)) => Some(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        _ => None,
    })
}
