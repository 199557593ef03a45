//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::topology::Topology;
use crate::transport::retry::RetryPolicy;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Shared battery parameters.
    #[serde(default)]
    pub battery: BatteryConfig,
    /// New-demand generation policy.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Eligibility analyzer parameters.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Transport boundary retry and history parameters.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulated seconds advanced by one tick (must be > 0).
    pub tick_seconds: u64,
    /// Wall-clock milliseconds per tick in the live pipeline.
    pub real_tick_ms: u64,
    /// Number of ticks for an offline run.
    pub ticks: usize,
    /// Master random seed.
    pub seed: u64,
    /// Community topology JSON file; the demo community is used when absent.
    pub topology: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 60,
            real_tick_ms: 1000,
            ticks: 720,
            seed: 42,
            topology: None,
        }
    }
}

/// Shared battery parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Maximum stored energy (kWh, must be > 0).
    pub max_capacity_kwh: f32,
    /// Initial stored energy (kWh, within `[0, max_capacity_kwh]`).
    pub initial_kwh: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            max_capacity_kwh: 20.0,
            initial_kwh: 10.0,
        }
    }
}

/// New-demand generation policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Minimum ticks between two generated demands.
    pub interval_min_ticks: u64,
    /// Maximum ticks between two generated demands.
    pub interval_max_ticks: u64,
    /// Minimum generated runtime (minutes).
    pub tau_min_minutes: u64,
    /// Maximum generated runtime (minutes).
    pub tau_max_minutes: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            interval_min_ticks: 60,
            interval_max_ticks: 90,
            tau_min_minutes: 1,
            tau_max_minutes: 5,
        }
    }
}

/// Eligibility analyzer parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Slack (`delta - tau`, seconds) below which a request is urgent.
    pub urgency_threshold_s: u64,
    /// Snapshot poll period in the live pipeline (ms).
    pub poll_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            urgency_threshold_s: 120,
            poll_ms: 1000,
        }
    }
}

/// Transport boundary retry and history parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Attempts per boundary call before giving up (must be > 0).
    pub retry_attempts: u32,
    /// Fixed delay between attempts (ms).
    pub retry_delay_ms: u64,
    /// Telemetry frames kept by the in-memory store.
    pub telemetry_history: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 5,
            retry_delay_ms: 500,
            telemetry_history: 1440,
        }
    }
}

impl TransportConfig {
    /// Retry policy applied at every boundary call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.max_capacity_kwh"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ScenarioConfig {
    /// Returns the baseline scenario.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the scarce preset: small battery, frequent demands.
    pub fn scarce() -> Self {
        Self {
            battery: BatteryConfig {
                max_capacity_kwh: 4.0,
                initial_kwh: 1.0,
            },
            workload: WorkloadConfig {
                interval_min_ticks: 5,
                interval_max_ticks: 15,
                ..WorkloadConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "scarce"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "scarce" => Ok(Self::scarce()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Loads the configured topology, or the demo community when none is set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the topology file is unreadable or invalid.
    pub fn load_topology(&self) -> Result<Topology, ConfigError> {
        match &self.simulation.topology {
            Some(path) => Topology::from_json_file(path),
            None => Ok(Topology::demo()),
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        if s.tick_seconds == 0 {
            errors.push(ConfigError {
                field: "simulation.tick_seconds".into(),
                message: "must be > 0".into(),
            });
        }
        if s.real_tick_ms == 0 {
            errors.push(ConfigError {
                field: "simulation.real_tick_ms".into(),
                message: "must be > 0".into(),
            });
        }

        let bat = &self.battery;
        if !bat.max_capacity_kwh.is_finite() || bat.max_capacity_kwh <= 0.0 {
            errors.push(ConfigError {
                field: "battery.max_capacity_kwh".into(),
                message: "must be > 0".into(),
            });
        }
        if !(0.0..=bat.max_capacity_kwh).contains(&bat.initial_kwh) {
            errors.push(ConfigError {
                field: "battery.initial_kwh".into(),
                message: "must be in [0.0, battery.max_capacity_kwh]".into(),
            });
        }

        let w = &self.workload;
        if w.interval_min_ticks == 0 {
            errors.push(ConfigError {
                field: "workload.interval_min_ticks".into(),
                message: "must be > 0".into(),
            });
        }
        if w.interval_min_ticks > w.interval_max_ticks {
            errors.push(ConfigError {
                field: "workload.interval_min_ticks".into(),
                message: "must be <= workload.interval_max_ticks".into(),
            });
        }
        if w.tau_min_minutes == 0 {
            errors.push(ConfigError {
                field: "workload.tau_min_minutes".into(),
                message: "must be > 0".into(),
            });
        }
        if w.tau_min_minutes > w.tau_max_minutes {
            errors.push(ConfigError {
                field: "workload.tau_min_minutes".into(),
                message: "must be <= workload.tau_max_minutes".into(),
            });
        }

        if self.analyzer.poll_ms == 0 {
            errors.push(ConfigError {
                field: "analyzer.poll_ms".into(),
                message: "must be > 0".into(),
            });
        }

        let t = &self.transport;
        if t.retry_attempts == 0 {
            errors.push(ConfigError {
                field: "transport.retry_attempts".into(),
                message: "must be > 0".into(),
            });
        }
        if t.telemetry_history == 0 {
            errors.push(ConfigError {
                field: "transport.telemetry_history".into(),
                message: "must be > 0".into(),
            });
        }

        errors
    }
}
