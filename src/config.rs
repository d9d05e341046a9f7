//! Scan configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with `DAQ_SCAN_`, nested keys split on `__`)
//!
//! The loop never reads configuration globally: a [`ScanConfig`] value is validated once
//! and moved into the acquisition when it is built.
//!
//! # Example
//! ```no_run
//! use daq_scan::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load_from("config/scan.toml")?;
//! config.validate()?;
//! println!("Averages: {}", config.scan.n_average);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, SequencerError};
use crate::scanner::{
    AdaptiveSource, AxisRange, GridScan, Learner1D, LinearScan, PositionSource, TabularScan,
};
use crate::tracing_config::OutputFormat;

/// Top-level configuration of the `daq-scan` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition settings handed to the loop
    #[serde(default)]
    pub scan: ScanConfig,
    /// Position sequencer
    pub scanner: ScannerConfig,
    /// Simulated hardware used by the binary
    #[serde(default)]
    pub mock: MockHardwareConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// Immutable acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Number of repetitions of the whole scan
    #[serde(default = "default_n_average")]
    pub n_average: usize,
    /// Positions come from an adaptive oracle instead of a precomputed list
    #[serde(default)]
    pub adaptive: bool,
    /// Wait after each move, before grabbing
    #[serde(default, with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Wait after each grab, before the next step
    #[serde(default, with = "humantime_serde")]
    pub step_delay: Duration,
    /// Watchdog raising the timeout flag once elapsed
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Channels forwarded to live consumers
    #[serde(default)]
    pub live: LiveConfig,
    /// Background capture settings
    #[serde(default)]
    pub background: BackgroundConfig,
    /// Adaptive mode limits
    #[serde(default)]
    pub adaptive_limits: AdaptiveConfig,
}

/// Live channel selection, as `<module>/<channel>` full names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Scalar channels
    #[serde(default)]
    pub plot_0d: Vec<String>,
    /// 1-D channels
    #[serde(default)]
    pub plot_1d: Vec<String>,
}

/// When background frames are captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundPolicy {
    /// Step 0 of every average; later frames replace earlier ones
    #[default]
    EveryAverage,
    /// Step 0 of the first average only
    FirstAverage,
}

/// Background capture and renaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Channel-name prefix of reference frames
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Raw reference channel name -> semantic name
    #[serde(default = "default_renames")]
    pub renames: BTreeMap<String, String>,
    /// Capture policy
    #[serde(default)]
    pub policy: BackgroundPolicy,
}

/// Limits of an adaptive scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Maximum number of points per average
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Full name of the channel fed back to the oracle
    #[serde(default)]
    pub probe: String,
}

/// Built-in position sequencers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScannerConfig {
    /// Fixed-step 1-D scan
    Linear {
        /// Actuator name
        actuator: String,
        /// First position
        start: f64,
        /// Last position (included when on the step grid)
        stop: f64,
        /// Signed increment
        step: f64,
    },
    /// Explicit list of points
    Tabular {
        /// Actuator names, one per coordinate
        actuators: Vec<String>,
        /// Points to visit in order
        positions: Vec<Vec<f64>>,
    },
    /// Rectangular N-D grid
    Grid {
        /// One range per actuator
        axes: Vec<AxisRange>,
    },
    /// 1-D adaptive scan driven by a [`Learner1D`]
    Adaptive {
        /// Actuator name
        actuator: String,
        /// Lower bound
        lower: f64,
        /// Upper bound
        upper: f64,
    },
}

/// Channel set of one simulated detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockDetectorConfig {
    /// Module name
    pub name: String,
    /// Number of scalar channels
    #[serde(default = "default_scalars")]
    pub scalars: usize,
    /// Length of the 1-D channel
    #[serde(default)]
    pub trace_len: Option<usize>,
    /// `[rows, cols]` of the 2-D channel
    #[serde(default)]
    pub image: Option<[usize; 2]>,
    /// Emit reference channels
    #[serde(default)]
    pub backgrounds: bool,
}

/// Simulated hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockHardwareConfig {
    /// Detectors
    #[serde(default = "default_mock_detectors")]
    pub detectors: Vec<MockDetectorConfig>,
    /// Per-actuator landing offset
    #[serde(default)]
    pub offsets: Vec<f64>,
    /// Uniform noise amplitude
    #[serde(default)]
    pub noise: f64,
    /// Noise seed
    #[serde(default)]
    pub seed: u64,
    /// Simulated move duration
    #[serde(default, with = "humantime_serde")]
    pub move_delay: Duration,
    /// Simulated grab duration
    #[serde(default, with = "humantime_serde")]
    pub grab_delay: Duration,
}

fn default_n_average() -> usize {
    1
}

fn default_marker() -> String {
    "Bg".to_string()
}

/// Rename table of the transient-absorption detector convention
pub fn default_renames() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Bg_fluo".to_string(), "I_ON".to_string()),
        ("Bg_dark".to_string(), "I_OFF".to_string()),
    ])
}

fn default_max_steps() -> usize {
    100
}

fn default_scalars() -> usize {
    1
}

fn default_mock_detectors() -> Vec<MockDetectorConfig> {
    vec![MockDetectorConfig {
        name: "det1".to_string(),
        scalars: 1,
        trace_len: None,
        image: None,
        backgrounds: false,
    }]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            n_average: default_n_average(),
            adaptive: false,
            settle_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            timeout: None,
            live: LiveConfig::default(),
            background: BackgroundConfig::default(),
            adaptive_limits: AdaptiveConfig::default(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            renames: default_renames(),
            policy: BackgroundPolicy::default(),
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            probe: String::new(),
        }
    }
}

impl Default for MockHardwareConfig {
    fn default() -> Self {
        Self {
            detectors: default_mock_detectors(),
            offsets: Vec::new(),
            noise: 0.0,
            seed: 0,
            move_delay: Duration::ZERO,
            grab_delay: Duration::ZERO,
        }
    }
}

impl ScanConfig {
    /// Live selection: 0-D channels followed by 1-D channels
    pub fn live_channels(&self) -> Vec<String> {
        self.live
            .plot_0d
            .iter()
            .chain(&self.live.plot_1d)
            .cloned()
            .collect()
    }

    /// Validate the acquisition settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_average == 0 {
            return Err(ConfigError::Invalid("n_average must be at least 1".into()));
        }
        if let Some(name) = self
            .live_channels()
            .into_iter()
            .find(|n| n.is_empty() || n.ends_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "Invalid live channel name '{}'",
                name
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.adaptive {
            if self.adaptive_limits.max_steps == 0 {
                return Err(ConfigError::Invalid(
                    "adaptive_limits.max_steps must be at least 1".into(),
                ));
            }
            if self.adaptive_limits.probe.is_empty() {
                return Err(ConfigError::Invalid(
                    "adaptive scans need adaptive_limits.probe".into(),
                ));
            }
        }
        Ok(())
    }
}

impl ScannerConfig {
    /// Actuator names in coordinate order
    pub fn actuators(&self) -> Vec<String> {
        match self {
            ScannerConfig::Linear { actuator, .. } | ScannerConfig::Adaptive { actuator, .. } => {
                vec![actuator.clone()]
            }
            ScannerConfig::Tabular { actuators, .. } => actuators.clone(),
            ScannerConfig::Grid { axes } => axes.iter().map(|a| a.actuator.clone()).collect(),
        }
    }

    /// True for oracle-driven scans
    pub fn is_adaptive(&self) -> bool {
        matches!(self, ScannerConfig::Adaptive { .. })
    }

    /// Build the position source for one scan
    pub fn build(&self, scan: &ScanConfig) -> Result<PositionSource, SequencerError> {
        Ok(match self {
            ScannerConfig::Linear {
                actuator,
                start,
                stop,
                step,
            } => PositionSource::Indexed(Box::new(LinearScan::new(
                actuator.clone(),
                *start,
                *stop,
                *step,
            )?)),
            ScannerConfig::Tabular {
                actuators,
                positions,
            } => PositionSource::Indexed(Box::new(TabularScan::new(
                actuators.clone(),
                positions.clone(),
            )?)),
            ScannerConfig::Grid { axes } => {
                PositionSource::Indexed(Box::new(GridScan::new(axes.clone())?))
            }
            ScannerConfig::Adaptive {
                actuator,
                lower,
                upper,
            } => PositionSource::Adaptive(AdaptiveSource::new(
                Box::new(Learner1D::new(*lower, *upper)?),
                vec![actuator.clone()],
                scan.adaptive_limits.max_steps,
                scan.adaptive_limits.probe.clone(),
            )),
        })
    }
}

impl AppConfig {
    /// Load configuration from a specific file path
    ///
    /// Environment variables override file values with prefix DAQ_SCAN_
    /// Example: DAQ_SCAN_SCAN__N_AVERAGE=3
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DAQ_SCAN_").split("__"))
            .extract()
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::string(toml)).extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.scan.validate()?;

        if self.scan.adaptive != self.scanner.is_adaptive() {
            return Err(ConfigError::Invalid(format!(
                "scan.adaptive = {} does not match scanner type",
                self.scan.adaptive
            )));
        }

        if self.mock.offsets.len() > self.scanner.actuators().len() {
            return Err(ConfigError::Invalid(format!(
                "{} mock offsets for {} actuators",
                self.mock.offsets.len(),
                self.scanner.actuators().len()
            )));
        }

        let mut names = std::collections::HashSet::new();
        for detector in &self.mock.detectors {
            if !names.insert(&detector.name) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate detector name: {}",
                    detector.name
                )));
            }
        }

        Ok(())
    }
}
