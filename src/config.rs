//! Configuration loading using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults
//! 2. A TOML file (`config/carousel.toml` unless another path is given)
//! 3. Environment variables (prefixed with `CAROUSEL_`, nested keys split on `__`)
//!
//! # Example
//! ```no_run
//! use carousel_daq::config::CarouselConfig;
//!
//! let config = CarouselConfig::load()?;
//! println!("Data folder: {}", config.storage.data_dir.display());
//! # Ok::<(), carousel_daq::error::CarouselError>(())
//! ```

use crate::error::{AppResult, CarouselError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/carousel.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarouselConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Trial store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to open; auto-detected when absent
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Wait after opening the port while the board resets, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Upper bound of a single blocking read, in milliseconds
    #[serde(default = "default_read_wait_ms")]
    pub read_wait_ms: u64,
    /// Sleep between empty reads, in milliseconds
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// How long disconnect waits for the reader to exit, in milliseconds
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

/// Trial store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Folder holding one file per day
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// File name prefix; files are named `<prefix>_MMDDYY.csv`
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Durations that govern connect, the read loop and disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    /// Wait after open while the board resets
    pub settle: Duration,
    /// Upper bound of one blocking read
    pub read_wait: Duration,
    /// Sleep after an empty read
    pub idle_delay: Duration,
    /// Sleep after a read error
    pub error_backoff: Duration,
    /// How long disconnect waits for the reader to exit
    pub stop_timeout: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        SerialConfig::default().timings()
    }
}

impl LinkTimings {
    /// Timings with no settle delay and short waits, for tests and simulators.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            read_wait: Duration::from_millis(5),
            idle_delay: Duration::from_millis(1),
            error_backoff: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_read_wait_ms() -> u64 {
    100
}

fn default_idle_delay_ms() -> u64 {
    10
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_file_prefix() -> String {
    "Carousel".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            settle_ms: default_settle_ms(),
            read_wait_ms: default_read_wait_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl SerialConfig {
    /// Convert millisecond settings into [`LinkTimings`].
    pub fn timings(&self) -> LinkTimings {
        LinkTimings {
            settle: Duration::from_millis(self.settle_ms),
            read_wait: Duration::from_millis(self.read_wait_ms),
            idle_delay: Duration::from_millis(self.idle_delay_ms),
            error_backoff: Duration::from_millis(100),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

impl CarouselConfig {
    /// Load configuration from `config/carousel.toml` and environment variables
    ///
    /// A missing file is not an error; defaults apply.
    /// Example override: `CAROUSEL_SERIAL__BAUD_RATE=9600`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(CarouselConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CAROUSEL_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.application.log_level.to_lowercase();
        if !valid_levels.contains(&level.as_str()) {
            return Err(CarouselError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(CarouselError::Configuration(
                "baud_rate must be greater than zero".to_string(),
            ));
        }

        let prefix = &self.storage.file_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(CarouselError::Configuration(format!(
                "Invalid file_prefix '{}'. Must be a non-empty file name fragment",
                prefix
            )));
        }

        Ok(())
    }
}
