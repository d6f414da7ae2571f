//! Detector settings
//!
//! Settings are read once at startup from `bpm_settings.json`. Every key is
//! optional and falls back to its default, but the file itself must exist.
//! The raw [`Settings`] are then validated into an immutable [`Config`] that
//! every pipeline stage reads from.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file name inside the base directory
pub const SETTINGS_FILE: &str = "bpm_settings.json";

/// Device preference file name inside the base directory
pub const DEVICE_CONFIG_FILE: &str = "bpm_device_config.json";

/// Pause flag file name inside the base directory
pub const PAUSE_FLAG_FILE: &str = "pause_flag.json";

/// Published BPM file name inside the base directory
pub const OUTPUT_FILE: &str = "bpm_config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings exactly as they appear in `bpm_settings.json`
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "SAMPLE_RATE", default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(rename = "DURATION", default = "default_duration")]
    pub duration: f64,

    #[serde(rename = "PRECISION_IN_MS", default = "default_precision_ms")]
    pub precision_ms: f64,

    #[serde(rename = "MIN_BPM", default = "default_min_bpm")]
    pub min_bpm: f64,

    #[serde(rename = "MAX_BPM", default = "default_max_bpm")]
    pub max_bpm: f64,

    #[serde(rename = "CONSIDERATION_TIME", default = "default_consideration_time")]
    pub consideration_time: f64,

    #[serde(rename = "LOWCUT", default = "default_low_cut")]
    pub low_cut: f64,

    #[serde(rename = "HIGHCUT", default = "default_high_cut")]
    pub high_cut: f64,

    /// Only publish once two consecutive estimates agree
    #[serde(rename = "salvar_somente_se_estavel", default)]
    pub require_stability: bool,

    /// Max BPM difference between consecutive estimates still considered stable
    #[serde(
        rename = "intervalo_considerado_estavel",
        default = "default_stability_tolerance"
    )]
    pub stability_tolerance: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            duration: default_duration(),
            precision_ms: default_precision_ms(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            consideration_time: default_consideration_time(),
            low_cut: default_low_cut(),
            high_cut: default_high_cut(),
            require_stability: false,
            stability_tolerance: default_stability_tolerance(),
        }
    }
}

fn default_sample_rate() -> u32 { 44_100 }
fn default_duration() -> f64 { 3.0 }
fn default_precision_ms() -> f64 { 20.0 }
fn default_min_bpm() -> f64 { 60.0 }
fn default_max_bpm() -> f64 { 250.0 }
fn default_consideration_time() -> f64 { 8.0 }
fn default_low_cut() -> f64 { 30.0 }
fn default_high_cut() -> f64 { 190.0 }
fn default_stability_tolerance() -> f64 { 3.0 }

/// Validated, read-only detector configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Length of one capture cycle in seconds
    pub capture_duration_secs: f64,

    /// Energy window length in milliseconds
    pub precision_ms: f64,

    /// Lowest tempo considered plausible
    pub min_bpm: f64,

    /// Highest tempo considered plausible
    pub max_bpm: f64,

    /// How far back beat timestamps are retained
    pub consideration_secs: f64,

    /// Band-pass lower cutoff in Hz
    pub low_cut_hz: f64,

    /// Band-pass upper cutoff in Hz
    pub high_cut_hz: f64,

    /// Publish only stable estimates
    pub require_stability: bool,

    /// Allowed BPM drift between consecutive estimates
    pub stability_tolerance_bpm: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            capture_duration_secs: default_duration(),
            precision_ms: default_precision_ms(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            consideration_secs: default_consideration_time(),
            low_cut_hz: default_low_cut(),
            high_cut_hz: default_high_cut(),
            require_stability: false,
            stability_tolerance_bpm: default_stability_tolerance(),
        }
    }
}

impl Config {
    /// Validate raw settings.
    ///
    /// Filter cutoffs are not checked here: degenerate bounds are reported
    /// when the filter is designed and only disable estimation.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        if settings.sample_rate == 0 {
            return Err(invalid("SAMPLE_RATE", "must be greater than 0"));
        }
        if !(settings.duration > 0.0) {
            return Err(invalid("DURATION", "must be greater than 0"));
        }
        if !(settings.precision_ms > 0.0) {
            return Err(invalid("PRECISION_IN_MS", "must be greater than 0"));
        }
        if !(settings.min_bpm > 0.0) {
            return Err(invalid("MIN_BPM", "must be greater than 0"));
        }
        if !(settings.min_bpm < settings.max_bpm) {
            return Err(invalid(
                "MAX_BPM",
                format!(
                    "must be greater than MIN_BPM ({} >= {})",
                    settings.min_bpm, settings.max_bpm
                ),
            ));
        }
        if !(settings.consideration_time > 0.0) {
            return Err(invalid("CONSIDERATION_TIME", "must be greater than 0"));
        }
        if !(settings.stability_tolerance >= 0.0) {
            return Err(invalid("intervalo_considerado_estavel", "must not be negative"));
        }

        let config = Self {
            sample_rate: settings.sample_rate,
            capture_duration_secs: settings.duration,
            precision_ms: settings.precision_ms,
            min_bpm: settings.min_bpm,
            max_bpm: settings.max_bpm,
            consideration_secs: settings.consideration_time,
            low_cut_hz: settings.low_cut,
            high_cut_hz: settings.high_cut,
            require_stability: settings.require_stability,
            stability_tolerance_bpm: settings.stability_tolerance,
        };

        if config.window_size() == 0 {
            return Err(invalid(
                "PRECISION_IN_MS",
                format!(
                    "{} ms is shorter than one sample at {} Hz",
                    config.precision_ms, config.sample_rate
                ),
            ));
        }
        if config.block_len() == 0 {
            return Err(invalid("DURATION", "shorter than one sample"));
        }

        Ok(config)
    }

    /// Parse and validate a settings document
    pub fn from_json_str(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_settings(settings)
    }

    /// Samples per energy window (truncated)
    pub fn window_size(&self) -> usize {
        (self.precision_ms / 1000.0 * self.sample_rate as f64) as usize
    }

    /// Duration of one energy window in seconds
    pub fn window_secs(&self) -> f64 {
        self.window_size() as f64 / self.sample_rate as f64
    }

    /// Samples per capture block
    pub fn block_len(&self) -> usize {
        (self.sample_rate as f64 * self.capture_duration_secs).round() as usize
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Load and validate the settings file
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_json_str(&content, path)
}

/// Locations of every file shared with the companion app
#[derive(Debug, Clone, PartialEq)]
pub struct BridgePaths {
    pub settings: PathBuf,
    pub device_config: PathBuf,
    pub pause_flag: PathBuf,
    pub output: PathBuf,
}

impl BridgePaths {
    /// All files under one directory, using the standard names
    pub fn in_dir(base: &Path) -> Self {
        Self {
            settings: base.join(SETTINGS_FILE),
            device_config: base.join(DEVICE_CONFIG_FILE),
            pause_flag: base.join(PAUSE_FLAG_FILE),
            output: base.join(OUTPUT_FILE),
        }
    }
}

/// Directory containing the running executable, or the working directory
pub fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Config, ConfigError> {
        Config::from_json_str(json, Path::new("bpm_settings.json"))
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse("{}").unwrap();

        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.capture_duration_secs, 3.0);
        assert_eq!(config.precision_ms, 20.0);
        assert_eq!(config.min_bpm, 60.0);
        assert_eq!(config.max_bpm, 250.0);
        assert_eq!(config.consideration_secs, 8.0);
        assert_eq!(config.low_cut_hz, 30.0);
        assert_eq!(config.high_cut_hz, 190.0);
        assert!(!config.require_stability);
        assert_eq!(config.stability_tolerance_bpm, 3.0);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn legacy_keys_are_recognised() {
        let config = parse(
            r#"{
                "SAMPLE_RATE": 48000,
                "DURATION": 4,
                "MIN_BPM": 70,
                "MAX_BPM": 200,
                "LOWCUT": 40.5,
                "salvar_somente_se_estavel": true,
                "intervalo_considerado_estavel": 5,
                "SOMETHING_ELSE": "ignored"
            }"#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.capture_duration_secs, 4.0);
        assert_eq!(config.min_bpm, 70.0);
        assert_eq!(config.max_bpm, 200.0);
        assert_eq!(config.low_cut_hz, 40.5);
        assert_eq!(config.high_cut_hz, 190.0);
        assert!(config.require_stability);
        assert_eq!(config.stability_tolerance_bpm, 5.0);
    }

    #[test]
    fn derived_sizes_follow_sample_rate() {
        let config = Config::default();

        assert_eq!(config.window_size(), 882);
        assert_eq!(config.block_len(), 132_300);
        assert!((config.window_secs() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn inverted_bpm_bounds_are_rejected() {
        let err = parse(r#"{"MIN_BPM": 200, "MAX_BPM": 100}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_BPM", .. }));
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = parse(r#"{"SAMPLE_RATE": 8000, "PRECISION_IN_MS": 0.01}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PRECISION_IN_MS", .. }));
    }

    #[test]
    fn degenerate_filter_bounds_still_load() {
        let config = parse(r#"{"LOWCUT": 300, "HIGHCUT": 100}"#).unwrap();
        assert_eq!(config.low_cut_hz, 300.0);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = parse("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join(SETTINGS_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"DURATION": 2}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.block_len(), 88_200);
    }

    #[test]
    fn bridge_paths_use_standard_names() {
        let paths = BridgePaths::in_dir(Path::new("/opt/app"));

        assert_eq!(paths.settings, Path::new("/opt/app/bpm_settings.json"));
        assert_eq!(paths.device_config, Path::new("/opt/app/bpm_device_config.json"));
        assert_eq!(paths.pause_flag, Path::new("/opt/app/pause_flag.json"));
        assert_eq!(paths.output, Path::new("/opt/app/bpm_config.json"));
    }
}
