// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use logbucket::config::BucketConfig;
use logbucket::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_COMPRESSED_EXTENSION, DEFAULT_COMPRESS_PROGRAM,
    DEFAULT_LOG_EXTENSION, DEFAULT_ROTATE_COUNT,
};
use logbucket::errors::ConfigError;
use logbucket::util::{parse_dump_interval, parse_max_size};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "logbucket",
    about = "Counts JSON event lines read from stdin and writes them to a rotated log"
)]
pub struct Args {
    /// Path to logs
    #[arg(long)]
    pub path: PathBuf,

    /// Log filename excluding extension
    #[arg(long)]
    pub name: String,

    /// Max log file size before rotation, valid suffixes are b, k, m, g or none (defaults to b)
    #[arg(long, default_value = "200m")]
    pub max_size: String,

    /// Buckets dump interval, valid suffixes are s, m, h or none (defaults to s)
    #[arg(long, default_value = "5m")]
    pub dump_interval: String,

    /// Compress logs with this program, empty disables compression
    #[arg(long, default_value = DEFAULT_COMPRESS_PROGRAM)]
    pub compress_prog: String,

    /// Extension of the log
    #[arg(long, default_value = DEFAULT_LOG_EXTENSION)]
    pub log_extension: String,

    /// Extension of the compressed log
    #[arg(long, default_value = DEFAULT_COMPRESSED_EXTENSION)]
    pub compressed_extension: String,

    /// Number of rotations
    #[arg(long, default_value_t = DEFAULT_ROTATE_COUNT)]
    pub rotate_count: u32,

    /// Number of lines buffered before reading stdin pauses
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub queue_size: usize,
}

impl Args {
    /// Converts the flags into a validated configuration.
    pub fn into_config(self) -> Result<BucketConfig, ConfigError> {
        let compress_program = if self.compress_prog.is_empty() {
            None
        } else {
            Some(PathBuf::from(self.compress_prog))
        };

        let config = BucketConfig {
            max_size: parse_max_size(&self.max_size)?,
            dump_interval: parse_dump_interval(&self.dump_interval)?,
            log_path: self.path,
            log_name: self.name,
            rotate_count: self.rotate_count,
            log_extension: self.log_extension,
            compressed_extension: self.compressed_extension,
            compress_program,
            channel_capacity: self.queue_size,
        };
        config.validate()?;
        Ok(config)
    }
}
