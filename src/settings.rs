use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::AnalyzerConfig;
use crate::error::PipelineError;
use crate::features::{self, DEFAULT_BIN_COUNT};
use crate::render::{default_mappings, OverlaySettings, ParameterMapping, RenderParameterBridge};

/// Returns the path to the settings file: `~/.config/pulse-rs/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("pulse-rs");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Audio input
    pub device: Option<String>,
    pub gain: f32,

    // Analysis
    pub analyzer: AnalyzerConfig,
    pub bin_count: usize,

    // Renderer parameter table
    pub parameters: Vec<ParameterMapping>,

    // Display
    pub overlay: OverlaySettings,
    pub preview_height: f32,
    pub show_parameters: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device: None,
            gain: 1.0,

            analyzer: AnalyzerConfig::default(),
            bin_count: DEFAULT_BIN_COUNT,

            parameters: default_mappings(),

            overlay: OverlaySettings::default(),
            preview_height: 360.0,
            show_parameters: true,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let settings: Self = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    return Self::default();
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                return Self::default();
            }
        };

        match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                log::warn!("Rejected settings ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Check everything the frame loop would otherwise trip over mid-run
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.analyzer.validate()?;
        features::bucket_ranges(self.analyzer.spectrum_len(), self.bin_count)?;
        RenderParameterBridge::new(self.parameters.clone(), self.bin_count)?;
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "Gain must be positive, got {}",
                self.gain
            )));
        }
        Ok(())
    }
}
