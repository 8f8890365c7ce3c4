// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Control loop of the bucket writer.
//!
//! The service task is the only owner of the count table, the active log handle and its byte
//! counter. Producers talk to it through a cloneable [`BucketHandle`]; lines, flush requests and
//! the stop request share one bounded FIFO channel, so a stop is handled after every line queued
//! before it, and a full queue makes producers wait instead of dropping lines.
//!
//! ```text
//!   BucketHandle ──Record/Flush/Stop──> BucketService ──> Aggregator
//!                                           │ timer tick / Flush
//!                                           v
//!                                        Flusher ──(size >= max)──> rotate ──> ArchiverService
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let (service, handle) = BucketService::new(Arc::new(config));
//! let task = tokio::spawn(service.run());
//!
//! handle.record("{\"event\":\"login\"}".to_string()).await?;
//! handle.stop().await?;
//! task.await??;
//! ```

use crate::aggregator::Aggregator;
use crate::archiver::{ArchiverHandle, ArchiverService};
use crate::config::BucketConfig;
use crate::errors::{BucketError, HandleError};
use crate::flusher::Flusher;
use crate::rotator;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug)]
pub enum BucketCommand {
    /// Count one event line
    Record(String),
    /// Flush now, rotating if the size threshold is reached
    Flush(oneshot::Sender<FlushReport>),
    /// Flush without rotating, wait for archiving to finish, then exit
    Stop(oneshot::Sender<()>),
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Distinct keys written
    pub records: usize,
    /// Bytes appended to the active log
    pub bytes: u64,
    /// Whether the active log was rotated afterwards
    pub rotated: bool,
}

#[derive(Clone, Debug)]
pub struct BucketHandle {
    tx: mpsc::Sender<BucketCommand>,
}

impl BucketHandle {
    /// Queues one event line. Waits while the queue is full.
    pub async fn record(&self, line: String) -> Result<(), HandleError> {
        self.tx
            .send(BucketCommand::Record(line))
            .await
            .map_err(HandleError::Send)
    }

    /// Flushes the counts gathered so far, as a timer tick would.
    pub async fn flush(&self) -> Result<FlushReport, HandleError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BucketCommand::Flush(response_tx))
            .await
            .map_err(HandleError::Send)?;
        response_rx.await.map_err(HandleError::Recv)
    }

    /// Requests shutdown and waits until the final flush has been written.
    ///
    /// There is no timeout: a stuck flush or archive pass blocks the caller.
    pub async fn stop(&self) -> Result<(), HandleError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(BucketCommand::Stop(ack_tx))
            .await
            .map_err(HandleError::Send)?;
        ack_rx.await.map_err(HandleError::Recv)
    }
}

pub struct BucketService {
    config: Arc<BucketConfig>,
    rx: mpsc::Receiver<BucketCommand>,
}

/// State mutated by the control loop only.
struct BucketWriter {
    config: Arc<BucketConfig>,
    aggregator: Aggregator,
    flusher: Flusher,
    archiver: ArchiverHandle,
}

/// Why the loop ended with an error.
enum LoopExit {
    /// The archiver task finished first; its result has been consumed
    Archiver(Result<Result<(), BucketError>, JoinError>),
    Fatal(BucketError),
}

fn archiver_failure(result: Result<Result<(), BucketError>, JoinError>) -> BucketError {
    match result {
        Ok(Err(e)) => e,
        Ok(Ok(())) => BucketError::ArchiverGone,
        Err(e) => BucketError::ArchiverTask(e),
    }
}

impl BucketWriter {
    async fn flush(&mut self, rotate_if_needed: bool) -> Result<FlushReport, BucketError> {
        // replaced even if the write fails
        let table = self.aggregator.take();
        let bytes = self.flusher.write_batch(&table).await;

        let rotated =
            rotate_if_needed && self.flusher.bytes_written() >= self.config.max_size;
        if rotated {
            rotator::rotate(&self.config, &mut self.flusher, &self.archiver).await?;
        }

        Ok(FlushReport {
            records: table.len(),
            bytes,
            rotated,
        })
    }

    async fn serve(
        &mut self,
        rx: &mut mpsc::Receiver<BucketCommand>,
        archiver_task: &mut JoinHandle<Result<(), BucketError>>,
    ) -> Result<Option<oneshot::Sender<()>>, LoopExit> {
        let mut dump_interval = interval(self.config.dump_interval);
        dump_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        dump_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(BucketCommand::Record(line)) => self.aggregator.record(&line),
                    Some(BucketCommand::Flush(response_tx)) => {
                        let report = self.flush(true).await.map_err(LoopExit::Fatal)?;
                        if response_tx.send(report).is_err() {
                            debug!("Flush requester went away before the response");
                        }
                    }
                    Some(BucketCommand::Stop(ack_tx)) => {
                        self.flush(false).await.map_err(LoopExit::Fatal)?;
                        return Ok(Some(ack_tx));
                    }
                    None => {
                        debug!("All bucket handles dropped");
                        self.flush(false).await.map_err(LoopExit::Fatal)?;
                        return Ok(None);
                    }
                },
                _ = dump_interval.tick() => {
                    self.flush(true).await.map_err(LoopExit::Fatal)?;
                }
                result = &mut *archiver_task => return Err(LoopExit::Archiver(result)),
            }
        }
    }
}

impl BucketService {
    /// Creates the service and its first handle. The configuration is validated by [`run`].
    ///
    /// [`run`]: BucketService::run
    #[must_use]
    pub fn new(config: Arc<BucketConfig>) -> (Self, BucketHandle) {
        // a zero capacity is rejected by `run`, the channel just must not panic before that
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        (Self { config, rx }, BucketHandle { tx })
    }

    /// Runs the control loop until stopped.
    ///
    /// Returns an error only for unrecoverable failures (an invalid configuration, a log
    /// directory that cannot be used); the caller is expected to terminate the process.
    pub async fn run(self) -> Result<(), BucketError> {
        let BucketService { config, mut rx } = self;
        debug!("Bucket service started");

        if let Err(e) = config.validate() {
            error!("Bucket service failed to start: {}", e);
            return Err(e.into());
        }

        let flusher = match Flusher::open(&config).await {
            Ok(flusher) => flusher,
            Err(e) => {
                error!("Bucket service failed to start: {}", e);
                return Err(e);
            }
        };
        let (archiver_service, archiver) = ArchiverService::new(Arc::clone(&config));
        let mut archiver_task = tokio::spawn(archiver_service.run());

        let mut writer = BucketWriter {
            config: Arc::clone(&config),
            aggregator: Aggregator::new(),
            flusher,
            archiver,
        };

        let startup = if writer.flusher.bytes_written() >= config.max_size {
            info!(
                "{} is already over {} bytes, rotating",
                writer.flusher.path().display(),
                config.max_size
            );
            rotator::rotate(&config, &mut writer.flusher, &writer.archiver)
                .await
                .map_err(LoopExit::Fatal)
        } else {
            Ok(())
        };

        let served = match startup {
            Ok(()) => writer.serve(&mut rx, &mut archiver_task).await,
            Err(exit) => Err(exit),
        };

        let ack = match served {
            Ok(ack) => ack,
            Err(LoopExit::Archiver(result)) => {
                let e = archiver_failure(result);
                error!("Bucket service stopped: {}", e);
                return Err(e);
            }
            Err(LoopExit::Fatal(BucketError::ArchiverGone)) => {
                // report why the archiver went away rather than the symptom
                let e = archiver_failure(archiver_task.await);
                error!("Bucket service stopped: {}", e);
                return Err(e);
            }
            Err(LoopExit::Fatal(e)) => {
                error!("Bucket service stopped: {}", e);
                return Err(e);
            }
        };

        // closing the job channel lets the worker exit once the in-flight pass is done
        drop(writer);
        let archived = match archiver_task.await {
            Ok(result) => result,
            Err(e) => Err(BucketError::ArchiverTask(e)),
        };
        if let Some(ack_tx) = ack {
            if ack_tx.send(()).is_err() {
                debug!("Stop requester went away before the acknowledgement");
            }
        }

        debug!("Bucket service stopped");
        archived
    }
}
