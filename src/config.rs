//! Environment-driven configuration.
//!
//! Every setting has a `TTS_*` environment variable; command-line flags
//! override them in the binary. Values are validated in one place so the
//! pipeline never sees a zero-sized limiter.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY,
    READ_TIMEOUT_SECS,
};
use crate::pipeline::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SCAN_CONCURRENCY, PipelineOptions};

pub const ENV_INPUT_DIR: &str = "TTS_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "TTS_OUTPUT_DIR";
pub const ENV_DATABASE_PATH: &str = "TTS_DATABASE_PATH";
pub const ENV_DOWNLOAD_CONCURRENCY: &str = "TTS_DOWNLOAD_CONCURRENCY";
pub const ENV_SCAN_CONCURRENCY: &str = "TTS_SCAN_CONCURRENCY";
pub const ENV_QUEUE_CAPACITY: &str = "TTS_QUEUE_CAPACITY";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "TTS_CONNECT_TIMEOUT_SECS";
pub const ENV_READ_TIMEOUT_SECS: &str = "TTS_READ_TIMEOUT_SECS";

/// Default output root.
pub const DEFAULT_OUTPUT_DIR: &str = "tmp/";

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "tmp/tts.db";

const MAX_SCAN_CONCURRENCY: usize = 64;
const MAX_QUEUE_CAPACITY: usize = 10_000;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds something that is not a number.
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    /// A numeric setting is outside its allowed range.
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// No input directory was given.
    #[error("no input directory: pass --input-dir or set {ENV_INPUT_DIR}")]
    MissingInputDir,
}

/// Resolved settings for an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
    pub download_concurrency: usize,
    pub scan_concurrency: usize,
    pub queue_capacity: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            download_concurrency: DEFAULT_CONCURRENCY,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl IngestConfig {
    /// Reads the `TTS_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] for a non-numeric value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup. Unset and
    /// blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] for a non-numeric value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(dir) = get(ENV_INPUT_DIR) {
            config.input_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = get(ENV_DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(value) = get(ENV_DOWNLOAD_CONCURRENCY) {
            config.download_concurrency = parse_number(ENV_DOWNLOAD_CONCURRENCY, &value)?;
        }
        if let Some(value) = get(ENV_SCAN_CONCURRENCY) {
            config.scan_concurrency = parse_number(ENV_SCAN_CONCURRENCY, &value)?;
        }
        if let Some(value) = get(ENV_QUEUE_CAPACITY) {
            config.queue_capacity = parse_number(ENV_QUEUE_CAPACITY, &value)?;
        }
        if let Some(value) = get(ENV_CONNECT_TIMEOUT_SECS) {
            config.connect_timeout_secs = parse_number(ENV_CONNECT_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = get(ENV_READ_TIMEOUT_SECS) {
            config.read_timeout_secs = parse_number(ENV_READ_TIMEOUT_SECS, &value)?;
        }

        Ok(config)
    }

    /// Checks every numeric setting against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first setting out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            ENV_DOWNLOAD_CONCURRENCY,
            self.download_concurrency,
            MIN_CONCURRENCY,
            MAX_CONCURRENCY,
        )?;
        check_range(
            ENV_SCAN_CONCURRENCY,
            self.scan_concurrency,
            1,
            MAX_SCAN_CONCURRENCY,
        )?;
        check_range(ENV_QUEUE_CAPACITY, self.queue_capacity, 1, MAX_QUEUE_CAPACITY)?;
        if self.connect_timeout_secs == 0 {
            return Err(out_of_range(ENV_CONNECT_TIMEOUT_SECS, 0, 1, u64::MAX));
        }
        if self.read_timeout_secs == 0 {
            return Err(out_of_range(ENV_READ_TIMEOUT_SECS, 0, 1, u64::MAX));
        }
        Ok(())
    }

    /// The input directory, required for ingestion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingInputDir`] when none was configured.
    pub fn require_input_dir(&self) -> Result<&PathBuf, ConfigError> {
        self.input_dir.as_ref().ok_or(ConfigError::MissingInputDir)
    }

    /// Pipeline options derived from this configuration.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            scan_concurrency: self.scan_concurrency,
            queue_capacity: self.queue_capacity,
        }
    }
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

fn check_range(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(out_of_range(name, value as u64, min as u64, max as u64))
    }
}

fn out_of_range(name: &'static str, value: u64, min: u64, max: u64) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        value,
        min,
        max,
    }
}
