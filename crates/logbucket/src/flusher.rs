// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Writes aggregated counts to the active log file.
//!
//! The [`Flusher`] owns the append-only handle of the active log and the number of bytes
//! appended through it. Write failures are logged and never returned: losing one flush worth of
//! counts is preferred over stopping the writer. Opening the file is the only fallible step.

use crate::aggregator::{flush_timestamp, Aggregator};
use crate::config::BucketConfig;
use crate::errors::BucketError;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

pub struct Flusher {
    path: PathBuf,
    /// None only between `close` and `reopen` during a rotation
    file: Option<File>,
    bytes_written: u64,
}

async fn open_append(path: &Path, create: bool) -> Result<File, BucketError> {
    OpenOptions::new()
        .append(true)
        .create(create)
        .open(path)
        .await
        .map_err(|source| BucketError::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl Flusher {
    /// Opens the active log, reusing an existing file so restarts do not lose data.
    ///
    /// The byte counter starts at the size of the existing file, or 0 when the file is created.
    /// Any stat error other than "not found" is fatal.
    pub async fn open(config: &BucketConfig) -> Result<Self, BucketError> {
        let path = config.active_log();
        let (file, bytes_written) = match fs::metadata(&path).await {
            Ok(metadata) => (open_append(&path, false).await?, metadata.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (open_append(&path, true).await?, 0),
            Err(source) => return Err(BucketError::Stat { path, source }),
        };
        info!(
            "Writing counts to {} ({} bytes already present)",
            path.display(),
            bytes_written
        );
        Ok(Self {
            path,
            file: Some(file),
            bytes_written,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended since the file was opened, seeded with its size at open time.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Serializes `table` and appends it in one write. Returns the bytes actually written.
    pub async fn write_batch(&mut self, table: &Aggregator) -> u64 {
        if table.is_empty() {
            return 0;
        }
        let buf = table.render(&flush_timestamp());
        let written = self.append(&buf).await;
        debug!(
            "Flushed {} records ({} of {} bytes) to {}",
            table.len(),
            written,
            buf.len(),
            self.path.display()
        );
        written
    }

    /// Appends `buf`, counting only the bytes the OS accepted before an error, if any.
    ///
    /// `tokio::fs::File` buffers a write and reports its outcome on the next operation, so each
    /// chunk is flushed before it is counted.
    pub async fn append(&mut self, buf: &[u8]) -> u64 {
        let Some(file) = self.file.as_mut() else {
            error!("Error writing to the log file: {} is closed", self.path.display());
            return 0;
        };

        let mut written = 0;
        while written < buf.len() {
            let n = match file.write(&buf[written..]).await {
                Ok(0) => {
                    error!("Error writing to the log file: no bytes accepted");
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error writing to the log file: {}", e);
                    break;
                }
            };
            if let Err(e) = file.flush().await {
                error!("Error writing to the log file: {}", e);
                break;
            }
            written += n;
        }

        self.bytes_written += written as u64;
        written as u64
    }

    /// Flushes and closes the handle. The file stays where it is.
    pub async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                error!("Error flushing {} before close: {}", self.path.display(), e);
            }
        }
    }

    /// Opens a fresh handle at the same path, creating the file if needed, and resets the count.
    pub async fn reopen(&mut self) -> Result<(), BucketError> {
        self.file = Some(open_append(&self.path, true).await?);
        self.bytes_written = 0;
        Ok(())
    }
}
