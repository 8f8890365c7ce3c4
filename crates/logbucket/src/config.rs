// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_COMPRESSED_EXTENSION, DEFAULT_COMPRESS_PROGRAM,
    DEFAULT_DUMP_INTERVAL, DEFAULT_LOG_EXTENSION, DEFAULT_MAX_SIZE, DEFAULT_ROTATE_COUNT,
};
use crate::errors::ConfigError;
use std::path::{PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

/// Configuration of a bucket writer. Set once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    /// Directory holding the active log and its rotated generations
    pub log_path: PathBuf,
    /// Log file name without extension
    pub log_name: String,
    /// Size in bytes at which the active log is rotated
    pub max_size: u64,
    /// How often aggregated counts are written out
    pub dump_interval: Duration,
    /// Number of rotated generations kept on disk, 0 disables archiving
    pub rotate_count: u32,
    /// Extension of the log files (e.g., "log")
    pub log_extension: String,
    /// Extension the compressor appends to generation files (e.g., "xz")
    pub compressed_extension: String,
    /// Compressor run on each freshly rotated generation, None disables compression
    pub compress_program: Option<PathBuf>,
    /// Bound of the queue between the line producer and the control loop
    pub channel_capacity: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::new(),
            log_name: String::new(),
            max_size: DEFAULT_MAX_SIZE,
            dump_interval: DEFAULT_DUMP_INTERVAL,
            rotate_count: DEFAULT_ROTATE_COUNT,
            log_extension: DEFAULT_LOG_EXTENSION.to_string(),
            compressed_extension: DEFAULT_COMPRESSED_EXTENSION.to_string(),
            compress_program: Some(PathBuf::from(DEFAULT_COMPRESS_PROGRAM)),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BucketConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "log path cannot be empty".to_string(),
            ));
        }

        if self.log_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "log name cannot be empty".to_string(),
            ));
        }

        if self.log_name.contains(MAIN_SEPARATOR) || self.log_name.contains('/') {
            return Err(ConfigError::InvalidConfig(format!(
                "log name '{}' must not contain a path separator",
                self.log_name
            )));
        }

        if self.log_extension.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "log extension cannot be empty".to_string(),
            ));
        }

        if self.compress_program.is_some() && self.compressed_extension.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "compressed extension cannot be empty when a compressor is set".to_string(),
            ));
        }

        if self.max_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "max log size must be greater than 0".to_string(),
            ));
        }

        if self.dump_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "dump interval must be greater than 0".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the file new records are appended to: `<dir>/<name>.<ext>`.
    #[must_use]
    pub fn active_log(&self) -> PathBuf {
        self.log_path
            .join(format!("{}.{}", self.log_name, self.log_extension))
    }

    /// Whether rotated generations end up compressed.
    #[must_use]
    pub fn archive_is_compressed(&self) -> bool {
        self.compress_program.is_some()
    }

    /// Path of rotated generation `generation`, `1` being the most recent.
    #[must_use]
    pub fn generation_log(&self, generation: u32, compressed: bool) -> PathBuf {
        let file_name = if compressed {
            format!(
                "{}.{}.{}.{}",
                self.log_name, generation, self.log_extension, self.compressed_extension
            )
        } else {
            format!("{}.{}.{}", self.log_name, generation, self.log_extension)
        };
        self.log_path.join(file_name)
    }

    /// Name the active log is moved to while it waits for the archiver.
    #[must_use]
    pub fn transient_log(&self, unix_secs: u64) -> PathBuf {
        self.log_path
            .join(format!("{}.{}.{}", self.log_name, unix_secs, self.log_extension))
    }
}
