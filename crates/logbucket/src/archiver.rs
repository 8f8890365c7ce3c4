// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background archiving of rotated logs.
//!
//! A rotated log is installed as generation 1 after every older generation has been shifted down
//! by one and the oldest one has been dropped. Archive passes never overlap: the worker processes
//! one job at a time, and a submitter has to [`reserve`](ArchiverHandle::reserve) the single slot
//! first, which waits for the previous pass to complete.
//!
//! ```text
//!   Rotator ── reserve() ──> slot (1 permit) ── submit(job + permit) ──> ArchiverService
//!      ^                                                                      │
//!      └──────────────────── permit released when the pass ends ──────────────┘
//! ```

use crate::config::BucketConfig;
use crate::errors::BucketError;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// A rotated log waiting to become generation 1.
#[derive(Debug)]
pub struct ArchiveJob {
    transient: PathBuf,
    /// Released when the job is dropped, which lets the next rotation proceed
    _permit: OwnedSemaphorePermit,
}

/// Submitting side of the archiver.
#[derive(Debug)]
pub struct ArchiverHandle {
    tx: mpsc::Sender<ArchiveJob>,
    slot: Arc<Semaphore>,
}

/// Exclusive right to run the next archive pass.
#[derive(Debug)]
pub struct ArchiveSlot {
    tx: mpsc::Sender<ArchiveJob>,
    permit: OwnedSemaphorePermit,
}

impl ArchiverHandle {
    /// Waits until no archive pass is running and takes the slot.
    ///
    /// Fails once the archiver has stopped on a fatal error.
    pub async fn reserve(&self) -> Result<ArchiveSlot, BucketError> {
        let permit = Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map_err(|_| BucketError::ArchiverGone)?;
        Ok(ArchiveSlot {
            tx: self.tx.clone(),
            permit,
        })
    }

    /// Waits for the in-flight archive pass, if any, to complete.
    pub async fn wait_idle(&self) -> Result<(), BucketError> {
        self.reserve().await.map(drop)
    }
}

impl ArchiveSlot {
    /// Hands `transient` to the worker. Returns as soon as the job is queued.
    pub async fn submit(self, transient: PathBuf) -> Result<(), BucketError> {
        self.tx
            .send(ArchiveJob {
                transient,
                _permit: self.permit,
            })
            .await
            .map_err(|_| BucketError::ArchiverGone)
    }

    /// Deletes `transient` without archiving it and releases the slot.
    pub async fn discard(self, transient: &Path) {
        if let Err(e) = fs::remove_file(transient).await {
            warn!("Error removing rotated log {}: {}", transient.display(), e);
        }
    }
}

/// Worker that owns the generation backlog.
pub struct ArchiverService {
    config: Arc<BucketConfig>,
    rx: mpsc::Receiver<ArchiveJob>,
    slot: Arc<Semaphore>,
}

impl ArchiverService {
    #[must_use]
    pub fn new(config: Arc<BucketConfig>) -> (Self, ArchiverHandle) {
        let (tx, rx) = mpsc::channel(1);
        let slot = Arc::new(Semaphore::new(1));
        let service = Self {
            config,
            rx,
            slot: Arc::clone(&slot),
        };
        (service, ArchiverHandle { tx, slot })
    }

    /// Processes jobs until every handle is dropped. A failed pass stops the worker.
    pub async fn run(mut self) -> Result<(), BucketError> {
        debug!("Archiver started");

        while let Some(job) = self.rx.recv().await {
            if let Err(e) = archive(&self.config, &job.transient).await {
                error!("Archiving {} failed: {}", job.transient.display(), e);
                // later rotations must not touch the files
                self.slot.close();
                return Err(e);
            }
        }

        debug!("Archiver stopped");
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), BucketError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BucketError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn rename_if_exists(from: &Path, to: &Path) -> Result<(), BucketError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BucketError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

/// Shifts the backlog down one generation and installs `transient` as generation 1.
///
/// Missing generations are skipped. Generation 1 is installed with the plain extension; when a
/// compressor is configured it is run on that file and expected to replace it in place with
/// `<file>.<compressed extension>`. A failing compressor leaves generation 1 uncompressed.
pub async fn archive(config: &BucketConfig, transient: &Path) -> Result<(), BucketError> {
    let rotate_count = config.rotate_count;
    if rotate_count == 0 {
        return remove_if_exists(transient).await;
    }
    let compressed = config.archive_is_compressed();

    remove_if_exists(&config.generation_log(rotate_count, compressed)).await?;
    for generation in (1..rotate_count).rev() {
        rename_if_exists(
            &config.generation_log(generation, compressed),
            &config.generation_log(generation + 1, compressed),
        )
        .await?;
    }

    let first = config.generation_log(1, false);
    fs::rename(transient, &first)
        .await
        .map_err(|source| BucketError::Rename {
            from: transient.to_path_buf(),
            to: first.clone(),
            source,
        })?;
    info!("Installed {} as {}", transient.display(), first.display());

    if let Some(program) = &config.compress_program {
        compress(program, &first).await;
    }
    Ok(())
}

async fn compress(program: &Path, target: &Path) {
    let status = Command::new(program)
        .arg(target)
        .stdin(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!("Compressed {}", target.display()),
        Ok(status) => error!(
            "Compression program failed: {} exited with {}",
            program.display(),
            status
        ),
        Err(e) => error!(
            "Compression program failed: {} could not be started: {}",
            program.display(),
            e
        ),
    }
}
