//! # Configuration System
//!
//! YAML configuration for applications built on the propagation crates:
//!
//! - Logging (level, format, output file)
//! - Exceedance-curve solver settings (probability domain, tolerance)
//! - Time-series synthesis defaults (step, correlation time, rain model)
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `PROPA_CONFIG` environment variable
//! 2. `./propa.yaml` (current directory)
//! 3. `~/.config/propa/config.yaml` (user config)
//! 4. `/etc/propa/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: compact
//!
//! solver:
//!   p_min: 0.001
//!   p_max: 50.0
//!   relative_tolerance: 1.0e-4
//!
//! synthesis:
//!   step_seconds: 1.0
//!   tau_seconds: 5000.0
//!   mean_event_duration_s: 3600.0
//!   min_dwell_steps: 1
//! ```

use crate::error::{PropaError, PropaResult};
use crate::exceedance::SolverConfig;
use crate::observe::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "PROPA_CONFIG";

/// Defaults for attenuation time-series synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Sample spacing in seconds
    pub step_seconds: f64,
    /// Correlation time of the underlying Gaussian process in seconds
    pub tau_seconds: f64,
    /// Fraction of time raining, in percent (derived from the curve if None)
    pub rain_fraction: Option<f64>,
    /// Mean duration of a rain event in seconds
    pub mean_event_duration_s: f64,
    /// Minimum number of steps between WET/DRY transitions (1 = no constraint)
    pub min_dwell_steps: u32,
    /// Attenuation (dB) above which the link counts as in rain, used to
    /// derive the rain fraction
    pub wet_threshold_db: f64,
    /// Residual clear-air attenuation in dB
    pub floor_db: f64,
    /// Time constant for the decay to the floor after rain stops
    /// (0 = immediate)
    pub dry_decay_seconds: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            step_seconds: 1.0,
            tau_seconds: 5000.0,
            rain_fraction: None,
            mean_event_duration_s: 3600.0,
            min_dwell_steps: 1,
            wet_threshold_db: 0.0,
            floor_db: 0.0,
            dry_decay_seconds: 0.0,
        }
    }
}

impl SynthesisConfig {
    /// Validate the synthesis settings.
    pub fn validate(&self) -> PropaResult<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(PropaError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, v
                )))
            }
        };
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(PropaError::InvalidParameter(format!(
                    "{} must be non-negative, got {}",
                    name, v
                )))
            }
        };

        positive("step_seconds", self.step_seconds)?;
        positive("tau_seconds", self.tau_seconds)?;
        positive("mean_event_duration_s", self.mean_event_duration_s)?;
        non_negative("wet_threshold_db", self.wet_threshold_db)?;
        non_negative("floor_db", self.floor_db)?;
        non_negative("dry_decay_seconds", self.dry_decay_seconds)?;

        if let Some(p0) = self.rain_fraction {
            if !(p0 > 0.0 && p0 <= 100.0) {
                return Err(PropaError::out_of_domain("rain_fraction", p0, 0.0, 100.0));
            }
        }
        if self.min_dwell_steps == 0 {
            return Err(PropaError::InvalidParameter(
                "min_dwell_steps must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropaConfig {
    /// Configuration version
    pub version: String,
    /// Logging configuration
    pub logging: LogConfig,
    /// Exceedance-curve solver configuration
    pub solver: SolverConfig,
    /// Synthesis defaults
    pub synthesis: SynthesisConfig,
}

impl Default for PropaConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            logging: LogConfig::default(),
            solver: SolverConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl PropaConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns the default config if no file is found.
    pub fn load() -> PropaResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&path);
            if path.exists() {
                return Self::load_from(path);
            }
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> PropaResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PropaError::Config(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> PropaResult<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| PropaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> PropaResult<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| PropaError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| PropaError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Configuration search paths, in priority order (after `PROPA_CONFIG`).
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./propa.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "propa") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/propa/config.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PropaResult<()> {
        self.solver
            .validate()
            .and_then(|_| self.synthesis.validate())
            .map_err(|e| PropaError::Config(e.to_string()))
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            logging: LogConfig::production(),
            solver: SolverConfig {
                p_max: 50.0,
                ..Default::default()
            },
            synthesis: SynthesisConfig {
                rain_fraction: Some(5.0),
                dry_decay_seconds: 120.0,
                ..Default::default()
            },
            ..Default::default()
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}
