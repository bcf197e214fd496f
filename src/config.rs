//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/spectroscan.toml` (base configuration)
//! 2. Environment variables prefixed with `SPECTROSCAN_`, nested keys
//!    separated by a double underscore
//!
//! Every section has defaults, so an empty or missing file yields a working
//! configuration.
//!
//! # Example
//! ```no_run
//! use spectroscan::config::AppConfig;
//!
//! // SPECTROSCAN_APPLICATION__LOG_LEVEL=debug overrides the file
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Writing to {}", config.storage.output_dir.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use scan_core::ScanOptions;
use scan_driver_mock::MockMode;
use scan_storage::SpectrumLengthPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/spectroscan.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Measurement file settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scan options, normalized into a run snapshot at start
    #[serde(default)]
    pub scan: ScanOptions,
    /// Simulated hardware
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Measurement file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for measurement files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Ragged spectra in the viewer: `zero-pad` or `truncate`
    #[serde(default = "default_cube_policy")]
    pub cube_policy: String,
}

/// Simulated stage and spectrometer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Timing model
    #[serde(default)]
    pub mode: MockMode,
    /// RNG seed for noise and fault decisions
    #[serde(default)]
    pub seed: Option<u64>,
    /// Stage travel speed, µm/s
    #[serde(default = "default_stage_velocity")]
    pub stage_velocity_um_per_s: f64,
    /// Spectrometer source: `synthetic` or `frame`
    #[serde(default = "default_source")]
    pub source: String,
    /// Sensor rows averaged per profile in frame mode
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    /// Relative noise amplitude
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Probability that a spectrometer read fails
    #[serde(default)]
    pub read_failure_rate: f64,
    /// Probability that a spectrometer read has no sample
    #[serde(default)]
    pub missing_sample_rate: f64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(scan_experiment::DEFAULT_OUTPUT_DIR)
}

fn default_cube_policy() -> String {
    "zero-pad".to_string()
}

fn default_stage_velocity() -> f64 {
    10_000.0
}

fn default_source() -> String {
    "synthetic".to_string()
}

fn default_frame_height() -> u32 {
    16
}

fn default_noise() -> f64 {
    0.01
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cube_policy: default_cube_policy(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::default(),
            seed: None,
            stage_velocity_um_per_s: default_stage_velocity(),
            source: default_source(),
            frame_height: default_frame_height(),
            noise: default_noise(),
            read_failure_rate: 0.0,
            missing_sample_rate: 0.0,
        }
    }
}

impl StorageConfig {
    /// Parsed ragged-spectrum policy.
    pub fn cube_policy(&self) -> Result<SpectrumLengthPolicy, String> {
        match self.cube_policy.to_ascii_lowercase().as_str() {
            "zero-pad" | "zero_pad" | "pad" => Ok(SpectrumLengthPolicy::ZeroPad),
            "truncate" => Ok(SpectrumLengthPolicy::Truncate),
            other => Err(format!(
                "Invalid cube_policy '{other}'. Must be one of: zero-pad, truncate"
            )),
        }
    }
}

impl AppConfig {
    /// Load from the default file and environment variables.
    ///
    /// Example override: `SPECTROSCAN_SCAN__STEP_X=10`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// Provider chain used by [`AppConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPECTROSCAN_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Numeric scan options are not checked here; out-of-range values are
    /// clamped with a warning when a run snapshots them.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.storage.output_dir.as_os_str().is_empty() {
            return Err("storage.output_dir must not be empty".to_string());
        }
        self.storage.cube_policy()?;

        let sim = &self.simulation;
        if !matches!(sim.source.as_str(), "synthetic" | "frame") {
            return Err(format!(
                "Invalid simulation source '{}'. Must be one of: synthetic, frame",
                sim.source
            ));
        }
        if sim.stage_velocity_um_per_s.is_nan() || sim.stage_velocity_um_per_s <= 0.0 {
            return Err(format!(
                "Invalid stage_velocity_um_per_s {}. Must be positive",
                sim.stage_velocity_um_per_s
            ));
        }
        if sim.frame_height == 0 {
            return Err("simulation.frame_height must be at least 1".to_string());
        }
        for (name, rate) in [
            ("read_failure_rate", sim.read_failure_rate),
            ("missing_sample_rate", sim.missing_sample_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("Invalid {name} {rate}. Must be within 0-1"));
            }
        }
        if sim.noise.is_nan() || sim.noise < 0.0 {
            return Err(format!("Invalid noise {}. Must be non-negative", sim.noise));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.output_dir, PathBuf::from("measurement_data"));
        assert_eq!(
            config.storage.cube_policy(),
            Ok(SpectrumLengthPolicy::ZeroPad)
        );
        assert_eq!(config.simulation.mode, MockMode::Instant);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cube_policy() {
        let mut config = AppConfig::default();
        config.storage.cube_policy = "stretch".to_string();
        let err = config.validate().expect_err("rejected");
        assert!(err.contains("cube_policy"));
    }

    #[test]
    fn test_invalid_rates() {
        let mut config = AppConfig::default();
        config.simulation.read_failure_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.simulation.source = "camera".to_string();
        assert!(config.validate().is_err());
    }
}
