//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/halo.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `HALO_`, nested with `__`
//!
//! Every field has a default, so an empty file or no file at all yields a
//! working configuration.
//!
//! # Example
//! ```no_run
//! use halo_core::config::HaloConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HaloConfig::load()?;
//! config.validate()?;
//! println!("Segment: {}", config.telemetry.segment_path.display());
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::classification::Pipeline;
use crate::error::{HaloError, Result};
use crate::thresholds::{Thresholds, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/halo.toml";

/// Prefix for environment overrides, e.g. `HALO_CLASSIFIER__PIPELINE=2`.
pub const ENV_PREFIX: &str = "HALO_";

/// Neural channels stored ahead of the metadata slots of every row.
pub const NEURAL_CHANNELS: u32 = 32;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HaloConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Shared-memory telemetry segment settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Response classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Partition store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output with colors
    #[default]
    Pretty,
    /// Single-line output without colors
    Compact,
    /// One JSON object per event
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Telemetry segment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Backing file of the shared segment
    #[serde(default = "default_segment_path")]
    pub segment_path: PathBuf,
    /// Number of acquisition streams
    #[serde(default = "default_stream_count")]
    pub stream_count: u32,
    /// Channels per stream
    #[serde(default = "default_channel_count")]
    pub channel_count: u32,
    /// Samples per published block
    #[serde(default = "default_samples_per_block")]
    pub samples_per_block: u32,
    /// Acquisition sample rate in Hz
    #[serde(default = "default_telemetry_sample_rate")]
    pub sample_rate: u32,
    /// Consumer poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            segment_path: default_segment_path(),
            stream_count: default_stream_count(),
            channel_count: default_channel_count(),
            samples_per_block: default_samples_per_block(),
            sample_rate: default_telemetry_sample_rate(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Active processing topology (0-9)
    #[serde(default)]
    pub pipeline: u8,
    /// Low threshold
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    /// High threshold
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pipeline: 0,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl ClassifierConfig {
    /// The configured topology.
    pub fn pipeline(&self) -> Result<Pipeline> {
        Pipeline::try_from(self.pipeline)
    }

    /// The configured threshold pair.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.low_threshold, self.high_threshold)
    }
}

/// Partition container format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionFormat {
    /// Arrow IPC stream files (`.arrows`)
    #[default]
    Arrow,
    /// HDF5 files (`.h5`), requires the `storage_hdf5` feature
    Hdf5,
}

impl PartitionFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            PartitionFormat::Arrow => "arrows",
            PartitionFormat::Hdf5 => "h5",
        }
    }

    /// Format implied by a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "arrows" => Some(PartitionFormat::Arrow),
            "h5" => Some(PartitionFormat::Hdf5),
            _ => None,
        }
    }
}

/// Partition store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding `<YYYY-MM-DD>/hour_HH.*` partitions
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Container format for new partitions
    #[serde(default)]
    pub format: PartitionFormat,
    /// Neural channels stored ahead of the metadata slots
    #[serde(default = "default_neural_channels")]
    pub neural_channels: u32,
    /// Row rate recorded in the partition header
    #[serde(default = "default_storage_sample_rate")]
    pub sample_rate: u32,
    /// Rows per HDF5 chunk
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            format: PartitionFormat::default(),
            neural_channels: default_neural_channels(),
            sample_rate: default_storage_sample_rate(),
            chunk_rows: default_chunk_rows(),
        }
    }
}

// Default value functions
fn default_name() -> String {
    "HALO Response Logger".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_segment_path() -> PathBuf {
    PathBuf::from("/dev/shm/intan_rhx_shm_v1")
}

fn default_stream_count() -> u32 {
    1
}

fn default_channel_count() -> u32 {
    32
}

fn default_samples_per_block() -> u32 {
    128
}

fn default_telemetry_sample_rate() -> u32 {
    30_000
}

fn default_poll_interval() -> u64 {
    1
}

fn default_low_threshold() -> f64 {
    DEFAULT_LOW_THRESHOLD
}

fn default_high_threshold() -> f64 {
    DEFAULT_HIGH_THRESHOLD
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_neural_channels() -> u32 {
    NEURAL_CHANNELS
}

fn default_storage_sample_rate() -> u32 {
    1000
}

fn default_chunk_rows() -> usize {
    1024
}

impl HaloConfig {
    /// Load configuration from `config/halo.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `HALO_`.
    /// Example: `HALO_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider stack used by [`HaloConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(HaloConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(HaloError::InvalidConfig(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let telemetry = &self.telemetry;
        if telemetry.stream_count == 0
            || telemetry.channel_count == 0
            || telemetry.samples_per_block == 0
        {
            return Err(HaloError::InvalidConfig(format!(
                "Telemetry geometry must be non-zero (streams={}, channels={}, samples={})",
                telemetry.stream_count, telemetry.channel_count, telemetry.samples_per_block
            )));
        }

        self.classifier.pipeline()?;
        for (name, value) in [
            ("low_threshold", self.classifier.low_threshold),
            ("high_threshold", self.classifier.high_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HaloError::InvalidConfig(format!(
                    "Invalid {name} {value}. Must be within 0.0-1.0"
                )));
            }
        }
        if !self.classifier.thresholds().is_ordered() {
            warn!(
                low = self.classifier.low_threshold,
                high = self.classifier.high_threshold,
                "low_threshold is not below high_threshold"
            );
        }

        // Readers locate the metadata slots by column count alone
        if self.storage.neural_channels != NEURAL_CHANNELS {
            return Err(HaloError::InvalidConfig(format!(
                "storage.neural_channels must be {NEURAL_CHANNELS}, got {}",
                self.storage.neural_channels
            )));
        }
        if self.storage.chunk_rows == 0 {
            return Err(HaloError::InvalidConfig(
                "storage.chunk_rows must be non-zero".to_string(),
            ));
        }
        if self.storage.format == PartitionFormat::Hdf5 && !cfg!(feature = "storage_hdf5") {
            return Err(HaloError::InvalidConfig(
                "storage.format 'hdf5' requires the storage_hdf5 feature".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HaloConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HaloConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.samples_per_block, 128);
        assert_eq!(config.storage.format, PartitionFormat::Arrow);
    }

    #[test]
    #[serial]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halo.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"
log_format = "json"

[classifier]
pipeline = 6
low_threshold = 0.2

[storage]
root_dir = "/tmp/halo-logs"
"#
        )
        .unwrap();

        let config = HaloConfig::load_from(&path).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, LogFormat::Json);
        assert_eq!(config.classifier.pipeline().unwrap(), Pipeline::NeoThrGate);
        assert_eq!(config.classifier.low_threshold, 0.2);
        assert_eq!(config.classifier.high_threshold, DEFAULT_HIGH_THRESHOLD);
        assert_eq!(config.storage.root_dir, PathBuf::from("/tmp/halo-logs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("HALO_CLASSIFIER__PIPELINE", "9");
        let result = HaloConfig::load_from(dir.path().join("absent.toml"));
        std::env::remove_var("HALO_CLASSIFIER__PIPELINE");

        let config = result.unwrap();
        assert_eq!(config.classifier.pipeline, 9);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HaloConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pipeline() {
        let mut config = HaloConfig::default();
        config.classifier.pipeline = 12;
        assert!(matches!(
            config.validate(),
            Err(HaloError::UnknownPipeline(12))
        ));
    }

    #[test]
    fn test_threshold_range() {
        let mut config = HaloConfig::default();
        config.classifier.high_threshold = 1.5;
        assert!(config.validate().is_err());

        // Inverted but in range is accepted
        config.classifier.high_threshold = 0.1;
        config.classifier.low_threshold = 0.9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_geometry_rejected() {
        let mut config = HaloConfig::default();
        config.telemetry.channel_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_neural_channel_count_is_fixed() {
        let mut config = HaloConfig::default();
        assert_eq!(config.storage.neural_channels, NEURAL_CHANNELS);

        for channels in [16, 28, 64] {
            config.storage.neural_channels = channels;
            assert!(matches!(
                config.validate(),
                Err(HaloError::InvalidConfig(msg)) if msg.contains("neural_channels")
            ));
        }
    }

    #[test]
    fn test_format_extensions() {
        assert_eq!(PartitionFormat::Arrow.extension(), "arrows");
        assert_eq!(PartitionFormat::from_extension("h5"), Some(PartitionFormat::Hdf5));
        assert_eq!(PartitionFormat::from_extension("csv"), None);
    }
}
