//! Bench configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `RATBENCH_`, nested keys separated by `__`
//!
//! ```text
//! RATBENCH_APPLICATION__LOG_LEVEL=debug
//! RATBENCH_TESTER__RESOURCE="TCPIP0::192.168.2.10::inst0::INSTR"
//! RATBENCH_STABILITY__TIMEOUT=90s
//! ```
//!
//! Durations are written the humantime way (`"100ms"`, `"60s"`, `"3m"`).
//!
//! # Example
//!
//! ```no_run
//! use rat_bench::config::BenchConfig;
//!
//! let config = BenchConfig::load_from("config/bench.toml")?;
//! println!("Tasks: {}", config.tasks.len());
//! # Ok::<(), rat_bench::error::BenchError>(())
//! ```

use crate::adapters::visa_adapter::DEFAULT_TIMEOUT;
use crate::error::{AppResult, BenchError};
use crate::rat::{GsmBand, LteBandwidth, PagingCycle, SignalRoute, Technology};
use crate::stability::SAMPLE_INTERVAL;
use crate::sync::PollPolicy;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level bench configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Radio tester connection
    pub tester: TesterConfig,
    /// RF path shared by every RAT
    pub routing: RoutingConfig,
    /// Two-point frequency correction table
    #[serde(default)]
    pub correction: Option<CorrectionTable>,
    /// DC source connection and output
    pub dc_source: DcSourceConfig,
    /// Completion and state poll cadence
    #[serde(default)]
    pub polling: PollingConfig,
    /// Current stability check
    #[serde(default)]
    pub stability: StabilityConfig,
    /// Signal levels applied on the first loop of each task
    #[serde(default)]
    pub levels: LevelsConfig,
    /// Ordered task descriptors
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,
    /// Directory receiving one result file per technology and mode
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Radio tester connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterConfig {
    /// VISA resource string (e.g. "TCPIP0::192.168.2.10::inst0::INSTR")
    pub resource: String,
    /// I/O timeout for a single exchange
    #[serde(with = "humantime_serde", default = "default_io_timeout")]
    pub timeout: Duration,
    /// Mirror the remote command trace to the tester display and its log folder
    #[serde(default = "default_true")]
    pub trace: bool,
}

/// Connector and converter numbers, e.g. `"1"` for RF1COM and converter 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Connector number
    pub connector: String,
    /// Signal converter number
    pub converter: String,
}

impl RoutingConfig {
    /// Route value handed to the tester session.
    pub fn signal_route(&self) -> SignalRoute {
        SignalRoute::new(self.connector.clone(), self.converter.clone())
    }
}

/// Cable loss compensation, linear between two frequencies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionTable {
    /// Lower frequency in MHz
    pub low_frequency_mhz: f64,
    /// Correction at the lower frequency in dB
    pub low_correction_db: f64,
    /// Upper frequency in MHz
    pub high_frequency_mhz: f64,
    /// Correction at the upper frequency in dB
    pub high_correction_db: f64,
}

/// DC source (Agilent 66319B) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcSourceConfig {
    /// VISA resource string (e.g. "GPIB0::15::INSTR")
    pub resource: String,
    /// I/O timeout for a single exchange
    #[serde(with = "humantime_serde", default = "default_io_timeout")]
    pub timeout: Duration,
    /// Output voltage in volts
    #[serde(default = "default_voltage")]
    pub voltage: f64,
    /// Over-voltage protection level in volts
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,
    /// Current measurement range for connected runs (0.02A, 1A or 3A)
    #[serde(default = "default_current_range")]
    pub current_range: String,
    /// Current measurement range for standby runs
    #[serde(default = "default_standby_current_range")]
    pub standby_current_range: String,
    /// Sweep sampling period in seconds
    #[serde(default = "default_sampling_period")]
    pub sampling_period_s: f64,
}

/// Completion and state poll cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub interval: Duration,
    /// Give up after this long; absent polls forever
    #[serde(with = "humantime_serde", default = "default_poll_deadline")]
    pub deadline: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            deadline: default_poll_deadline(),
        }
    }
}

impl PollingConfig {
    /// Poll policy shared by every controller of the session.
    pub fn policy(&self) -> PollPolicy {
        let policy = match self.deadline {
            Some(deadline) => PollPolicy::bounded(deadline),
            None => PollPolicy::unbounded(),
        };
        policy.with_interval(self.interval)
    }
}

/// Current stability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Give up on a settled current after this long
    #[serde(with = "humantime_serde", default = "default_stability_timeout")]
    pub timeout: Duration,
    /// Width of the sliding window
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    /// Mean absolute deviation threshold in mA
    #[serde(default = "default_max_deviation")]
    pub max_deviation_ma: f64,
    /// Threshold used for LTE and WCDMA idle-mode current
    #[serde(default = "default_standby_max_deviation")]
    pub standby_max_deviation_ma: f64,
    /// Averaging duration of the recorded current
    #[serde(with = "humantime_serde", default = "default_measure_duration")]
    pub measure_duration: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            timeout: default_stability_timeout(),
            window: default_window(),
            max_deviation_ma: default_max_deviation(),
            standby_max_deviation_ma: default_standby_max_deviation(),
            measure_duration: default_measure_duration(),
        }
    }
}

/// Signal levels and idle parameters applied on the first loop of each task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelsConfig {
    /// Uplink target powers (dBm) measured per LTE/WCDMA record
    pub target_powers: Vec<String>,
    /// GSM band the BCCH starts on in connected runs
    pub gsm_initial_band: String,
    /// GSM channel the BCCH and TCH start on in connected runs
    pub gsm_initial_channel: String,
    /// GSM BCCH level (dBm)
    pub gsm_bcch_level: String,
    /// GSM TCH level (dBm)
    pub gsm_tch_level: String,
    /// GSM BS-PA-MFRMS for standby runs
    pub gsm_bspamfrms: u8,
    /// WCDMA downlink carrier power (dBm)
    pub wcdma_downlink_power: String,
    /// WCDMA PRACH DRX cycle for standby runs
    pub wcdma_drx_cycle: u8,
    /// LTE RS EPRE level (dBm)
    pub lte_rsep_level: String,
    /// LTE open-loop nominal power (dBm)
    pub lte_open_loop_power: String,
    /// LTE paging cycle in frames for standby runs
    pub lte_paging_cycle: String,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            target_powers: vec!["0".into(), "10".into(), "25".into()],
            gsm_initial_band: "GSM850".into(),
            gsm_initial_channel: "128".into(),
            gsm_bcch_level: "-80".into(),
            gsm_tch_level: "-80".into(),
            gsm_bspamfrms: 5,
            wcdma_downlink_power: "-80".into(),
            wcdma_drx_cycle: 7,
            lte_rsep_level: "-85".into(),
            lte_open_loop_power: "20".into(),
            lte_paging_cycle: "128".into(),
        }
    }
}

/// One technology's list of configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Technology the records configure
    pub format: Technology,
    /// Records, measured in order
    #[serde(default)]
    pub configurations: Vec<ChannelRecord>,
}

/// One measured configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Band: `GSM850`..`PCS1900` for GSM, operating band number otherwise
    pub band: String,
    /// Downlink channel
    pub dl_channel: String,
    /// LTE bandwidth in MHz
    #[serde(default)]
    pub bandwidth: Option<String>,
    /// LTE uplink RB count
    #[serde(default)]
    pub rb_number: Option<String>,
    /// LTE uplink RB position (LOW, MID, HIGH)
    #[serde(default)]
    pub rb_position: Option<String>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "rat_bench".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_true() -> bool {
    true
}

fn default_io_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_voltage() -> f64 {
    4.0
}

fn default_max_voltage() -> f64 {
    4.4
}

fn default_current_range() -> String {
    "3A".to_string()
}

fn default_standby_current_range() -> String {
    "1A".to_string()
}

fn default_sampling_period() -> f64 {
    15.6e-6
}

fn default_poll_interval() -> Duration {
    PollPolicy::DEFAULT_INTERVAL
}

fn default_poll_deadline() -> Option<Duration> {
    Some(PollPolicy::DEFAULT_DEADLINE)
}

fn default_stability_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_window() -> Duration {
    Duration::from_secs(10)
}

fn default_max_deviation() -> f64 {
    50.0
}

fn default_standby_max_deviation() -> f64 {
    0.5
}

fn default_measure_duration() -> Duration {
    Duration::from_secs(30)
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl BenchConfig {
    /// Load configuration from `path` and `RATBENCH_` environment variables, then validate.
    ///
    /// Environment variables take precedence over the file.
    ///
    /// # Errors
    ///
    /// - [`BenchError::Config`] if the file cannot be read or does not deserialize
    /// - [`BenchError::Configuration`] if validation fails
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("RATBENCH_").split("__")),
        )
    }

    /// Parse configuration from TOML text only (no environment overrides), then validate.
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Self::extract(Figment::from(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Instrument resources and route are not empty
    /// - Voltage is within the protection limit
    /// - Intervals are positive and the stability window holds at least one sample
    /// - Every task record carries the fields its technology needs, with known codes
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Configuration`] describing the first failure.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(BenchError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.tester.resource.trim().is_empty() {
            return Err(invalid("tester.resource cannot be empty"));
        }
        if self.dc_source.resource.trim().is_empty() {
            return Err(invalid("dc_source.resource cannot be empty"));
        }
        if self.routing.connector.trim().is_empty() || self.routing.converter.trim().is_empty() {
            return Err(invalid("routing.connector and routing.converter are required"));
        }

        if self.dc_source.voltage > self.dc_source.max_voltage {
            return Err(BenchError::Configuration(format!(
                "dc_source.voltage {:.1} V exceeds max_voltage {:.1} V",
                self.dc_source.voltage, self.dc_source.max_voltage
            )));
        }
        if self.dc_source.sampling_period_s <= 0.0 {
            return Err(invalid("dc_source.sampling_period_s must be > 0"));
        }

        if self.polling.interval.is_zero() {
            return Err(invalid("polling.interval must be > 0"));
        }
        if self.stability.window < SAMPLE_INTERVAL {
            return Err(BenchError::Configuration(format!(
                "stability.window must be at least {:?}",
                SAMPLE_INTERVAL
            )));
        }
        if self.stability.measure_duration.is_zero() {
            return Err(invalid("stability.measure_duration must be > 0"));
        }

        self.levels.lte_paging_cycle.parse::<PagingCycle>()?;
        self.levels.gsm_initial_band.parse::<GsmBand>()?;

        for task in &self.tasks {
            for (index, record) in task.configurations.iter().enumerate() {
                validate_record(task.format, index, record)?;
            }
        }

        Ok(())
    }

    /// Last descriptor per technology, in GSM, WCDMA, LTE order.
    pub fn ordered_tasks(&self) -> Vec<&TaskDescriptor> {
        Technology::RUN_ORDER
            .iter()
            .filter_map(|tech| self.tasks.iter().rev().find(|t| t.format == *tech))
            .collect()
    }
}

fn invalid(message: &str) -> BenchError {
    BenchError::Configuration(message.to_string())
}

fn validate_record(format: Technology, index: usize, record: &ChannelRecord) -> AppResult<()> {
    let context = |field: &str| {
        BenchError::Configuration(format!(
            "{} record {}: '{}' is required",
            format, index, field
        ))
    };
    if record.band.trim().is_empty() {
        return Err(context("band"));
    }
    if record.dl_channel.trim().is_empty() {
        return Err(context("dl_channel"));
    }
    match format {
        Technology::Gsm => {
            record.band.parse::<GsmBand>()?;
        }
        Technology::Wcdma => {}
        Technology::Lte => {
            record
                .bandwidth
                .as_deref()
                .ok_or_else(|| context("bandwidth"))?
                .parse::<LteBandwidth>()?;
            if record.rb_number.is_none() {
                return Err(context("rb_number"));
            }
            if record.rb_position.is_none() {
                return Err(context("rb_position"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [application]
        log_level = "debug"

        [tester]
        resource = "TCPIP0::192.168.2.10::inst0::INSTR"

        [routing]
        connector = "1"
        converter = "1"

        [dc_source]
        resource = "GPIB0::15::INSTR"

        [[tasks]]
        format = "LTE_FDD"
        configurations = [
            { band = "3", dl_channel = "1575", bandwidth = "10", rb_number = "12", rb_position = "LOW" },
        ]

        [[tasks]]
        format = "GSM"
        configurations = [{ band = "DCS1800", dl_channel = "512" }]
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BenchConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.tester.timeout, Duration::from_secs(10));
        assert_eq!(config.polling.policy(), PollPolicy::default());
        assert_eq!(config.stability.timeout, Duration::from_secs(60));
        assert_eq!(config.stability.window, Duration::from_secs(10));
        assert_eq!(config.dc_source.max_voltage, 4.4);
        assert_eq!(config.levels.target_powers, vec!["0", "10", "25"]);
        assert!(config.correction.is_none());
    }

    #[test]
    fn test_humantime_durations() {
        let toml = MINIMAL.replace(
            "[routing]",
            "[stability]\ntimeout = \"90s\"\nwindow = \"5s\"\n\n[polling]\ninterval = \"250ms\"\n\n[routing]",
        );
        let config = BenchConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.stability.timeout, Duration::from_secs(90));
        assert_eq!(config.stability.window, Duration::from_secs(5));
        assert_eq!(config.polling.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_ordered_tasks() {
        let config = BenchConfig::from_toml_str(MINIMAL).unwrap();
        let order: Vec<Technology> = config.ordered_tasks().iter().map(|t| t.format).collect();
        assert_eq!(order, vec![Technology::Gsm, Technology::Lte]);
    }

    #[test]
    fn test_last_descriptor_wins() {
        let toml = format!(
            "{}\n[[tasks]]\nformat = \"GSM\"\nconfigurations = [{{ band = \"GSM900\", dl_channel = \"62\" }}]\n",
            MINIMAL
        );
        let config = BenchConfig::from_toml_str(&toml).unwrap();
        let tasks = config.ordered_tasks();
        assert_eq!(tasks[0].configurations[0].band, "GSM900");
    }

    #[test]
    fn test_invalid_log_level() {
        let toml = MINIMAL.replace("\"debug\"", "\"verbose\"");
        let err = BenchConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_lte_record_needs_bandwidth() {
        let toml = MINIMAL.replace("bandwidth = \"10\", ", "");
        let err = BenchConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("bandwidth"));
    }

    #[test]
    fn test_unknown_gsm_band() {
        let toml = MINIMAL.replace("DCS1800", "GSM450");
        let err = BenchConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, BenchError::UnknownCode { .. }));
    }

    #[test]
    fn test_voltage_above_protection() {
        let toml = MINIMAL.replace(
            "resource = \"GPIB0::15::INSTR\"",
            "resource = \"GPIB0::15::INSTR\"\nvoltage = 4.6",
        );
        let err = BenchConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("max_voltage"));
    }

    #[test]
    fn test_missing_section_is_load_error() {
        let err = BenchConfig::from_toml_str("[application]\nlog_level = \"info\"\n").unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = BenchConfig::load_from(file.path()).unwrap();
        assert_eq!(config.routing.signal_route(), SignalRoute::new("1", "1"));
    }
}
