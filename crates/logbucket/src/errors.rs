// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the bucket writer.
//!
//! Errors come in two tiers. [`BucketError`] is the unrecoverable tier: the log directory is
//! unusable and the process has to stop. Recoverable failures (a failed append, a failed
//! compressor run) never surface as values; they are logged where they happen.

use crate::bucket_service::BucketCommand;
use std::io;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// Fatal failures of the control loop, the rotator or the archiver.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("Stat of {} failed with an error: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("Error opening file {} for writing: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Error renaming {} into {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Error removing {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("Bucket service cannot start: {0}")]
    Config(#[from] ConfigError),

    #[error("Archiver is no longer accepting jobs")]
    ArchiverGone,

    #[error("Archiver task failed: {0}")]
    ArchiverTask(#[from] tokio::task::JoinError),
}

/// Failures talking to a running [`crate::bucket_service::BucketService`].
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The service loop has exited and no longer reads commands.
    #[error("Failed to send command to bucket service: {0}")]
    Send(mpsc::error::SendError<BucketCommand>),

    /// The service dropped the reply channel, which happens when it exits on a fatal error.
    #[error("Failed to receive response from bucket service: {0}")]
    Recv(oneshot::error::RecvError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Error parsing max log size: {0}")]
    InvalidMaxSize(String),

    #[error("Error parsing dump interval: {0}")]
    InvalidDumpInterval(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BucketError::Rename {
            from: PathBuf::from("/var/log/app.log"),
            to: PathBuf::from("/var/log/app.1700000000.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            error.to_string(),
            "Error renaming /var/log/app.log into /var/log/app.1700000000.log: denied"
        );

        let error = ConfigError::InvalidMaxSize("12q".to_string());
        assert_eq!(error.to_string(), "Error parsing max log size: 12q");
    }

    #[test]
    fn test_io_source_is_exposed() {
        use std::error::Error;

        let error = BucketError::Stat {
            path: PathBuf::from("/nope"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.source().is_some());
    }
}
