//! Configuration management for Plectrum
//!
//! This module provides:
//! - Application, metronome and tuner settings with TOML serialization
//! - Audio device selection
//! - Preset store (one TOML file per preset)
//! - The main config file manager with corrupt-file recovery

use crate::domain::audio::DeviceId;
use crate::domain::metronome::MetronomeConfig;
use crate::domain::preset::{slug, Preset};
use crate::domain::tuner::TunerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sample rate of the audio context
    pub sample_rate: u32,

    /// Audio buffer size in frames
    pub buffer_size: u32,

    /// Window of the chain's analysis tap in samples
    pub analysis_size: usize,

    /// Preset directory
    pub preset_dir: PathBuf,

    pub metronome: MetronomeConfig,

    pub tuner: TunerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            analysis_size: 2048,
            preset_dir: PathBuf::from("presets"),
            metronome: MetronomeConfig::default(),
            tuner: TunerConfig::default(),
        }
    }
}

/// Audio device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioDeviceConfig {
    /// Input device ID (empty = use default)
    #[serde(default)]
    pub input_device: String,

    /// Output device ID (empty = use default)
    #[serde(default)]
    pub output_device: String,
}

impl AudioDeviceConfig {
    pub fn input(&self) -> Option<DeviceId> {
        non_empty(&self.input_device)
    }

    pub fn output(&self) -> Option<DeviceId> {
        non_empty(&self.output_device)
    }
}

fn non_empty(id: &str) -> Option<DeviceId> {
    let id = id.trim();
    (!id.is_empty()).then(|| DeviceId::from(id))
}

/// Complete Plectrum configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlectrumConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub audio: AudioDeviceConfig,
}

impl PlectrumConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory defaults with presets stored under `config_dir`
    pub fn factory_default(config_dir: &Path) -> Self {
        let mut config = Self::default();
        config.app.preset_dir = config_dir.join("presets");
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.app.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be positive".to_string()));
        }
        if !self.app.analysis_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "analysis_size must be a power of two, got {}",
                self.app.analysis_size
            )));
        }
        if self.app.metronome.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "metronome.tick_interval_ms must be positive".to_string(),
            ));
        }
        self.app
            .tuner
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

// ============================================================================
// PRESETS
// ============================================================================

/// Preset store: one TOML file per preset in `preset_dir`
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", slug(name)))
    }

    /// List stored preset ids, sorted. A missing directory holds no presets.
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();
        if !self.preset_dir.exists() {
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name or id
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<Preset> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let preset: Preset = toml::from_str(&contents)?;
        debug!(path = %path.display(), effects = preset.effects.len(), "Preset loaded");
        Ok(preset)
    }

    /// Save a preset under its id, replacing any previous version
    #[instrument(skip(self, preset), fields(id = %preset.id))]
    pub async fn save_preset(&self, preset: &Preset) -> Result<()> {
        fs::create_dir_all(&self.preset_dir).await?;
        let path = self.path_for(&preset.id);
        fs::write(&path, toml::to_string_pretty(preset)?).await?;
        info!(path = %path.display(), "Preset saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }
}

// ============================================================================
// CONFIG FILE
// ============================================================================

/// Manager of the main configuration file at `~/.config/plectrum/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// `~/.config/plectrum` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("plectrum"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields (and writes) factory defaults. A corrupt file
    /// is backed up to `config.toml.corrupt` and factory defaults are used.
    #[instrument(skip(self))]
    pub async fn load(&self) -> PlectrumConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = PlectrumConfig::factory_default(&self.config_dir);
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match PlectrumConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                PlectrumConfig::factory_default(&self.config_dir)
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &PlectrumConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
