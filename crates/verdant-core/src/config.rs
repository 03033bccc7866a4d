//! Configuration loading and typed config structures for the Verdant
//! simulation.
//!
//! The canonical configuration lives in `verdant-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//! Every field has a default, so a partial file (or none at all) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verdant_events::SchedulerConfig;
use verdant_types::Layer;
use verdant_world::{DEFAULT_CHUNK_SIZE, DiffusionSettings, MAX_CHUNK_SIZE};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `verdant-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// World identity and field geometry.
    #[serde(default)]
    pub world: WorldConfig,

    /// Environment update toggles.
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Event delivery settings.
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Run loop boundaries and pacing.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,

    /// Initial field contents written by the engine before the first tick.
    #[serde(default)]
    pub seeding: SeedingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`from_file`](Self::from_file), but returns the defaults when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.width == 0 || self.world.height == 0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "world dimensions must be non-zero (got {}x{})",
                    self.world.width, self.world.height
                ),
            });
        }
        if self.world.chunk_size == 0 || self.world.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "chunk_size must be within 1..={MAX_CHUNK_SIZE} (got {})",
                    self.world.chunk_size
                ),
            });
        }
        let rate = self.environment.diffusion_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Invalid {
                reason: format!("diffusion_rate must be within 0.0..=1.0 (got {rate})"),
            });
        }
        Ok(())
    }
}

/// World identity and field geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Field width in cells.
    #[serde(default = "default_extent")]
    pub width: u32,

    /// Field height in cells.
    #[serde(default = "default_extent")]
    pub height: u32,

    /// Side length of a field chunk in cells.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            width: default_extent(),
            height: default_extent(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Environment update toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Whether the per-tick environment update runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Neighbour blend rate per tick; 0 disables diffusion.
    #[serde(default)]
    pub diffusion_rate: f32,

    /// Layers the diffusion pass blends.
    #[serde(default = "default_diffusion_layers")]
    pub diffusion_layers: Vec<Layer>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            diffusion_rate: 0.0,
            diffusion_layers: default_diffusion_layers(),
        }
    }
}

impl EnvironmentConfig {
    /// Diffusion settings for the environment system.
    pub fn diffusion_settings(&self) -> DiffusionSettings {
        DiffusionSettings::new(self.diffusion_rate, self.diffusion_layers.iter().copied())
    }
}

/// Event delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Per-handler time budget in milliseconds (0 = unbounded).
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

impl SchedulerSettings {
    /// Scheduler configuration these settings describe.
    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            handler_timeout: if self.handler_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(self.handler_timeout_ms))
            },
        }
    }
}

/// Run loop boundaries and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Maximum number of ticks before the simulation ends (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the simulation ends (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,

    /// Real-time milliseconds between ticks (0 = as fast as possible).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            max_ticks: 0,
            max_real_time_seconds: 0,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Initial field contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedingConfig {
    /// Number of circular patches of terrain to seed.
    #[serde(default = "default_patches")]
    pub patches: u32,

    /// Radius of each patch in cells.
    #[serde(default = "default_patch_radius")]
    pub patch_radius: u32,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            patches: default_patches(),
            patch_radius: default_patch_radius(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter
    /// directive. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Verdant".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_extent() -> u32 {
    7000
}

const fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_diffusion_layers() -> Vec<Layer> {
    vec![Layer::Temperature, Layer::Humidity]
}

const fn default_handler_timeout_ms() -> u64 {
    30_000
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_patches() -> u32 {
    4
}

const fn default_patch_radius() -> u32 {
    32
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
