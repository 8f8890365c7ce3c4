// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod cli;

use clap::Parser;
use std::{env, process, sync::Arc};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logbucket::bucket_service::{BucketHandle, BucketService};

/// Reads lines until EOF and forwards them to the bucket service.
///
/// Returns early if the service goes away. Trailing `\n` and `\r\n` are stripped and
/// invalid UTF-8 is replaced rather than rejected.
async fn pump_lines<R>(mut reader: R, handle: &BucketHandle) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut lines = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(lines);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if let Err(e) = handle.record(line).await {
            debug!("Stopped reading input: {}", e);
            return Ok(lines);
        }
        lines += 1;
    }
}

/// Keeps SIGINT and SIGTERM from killing the process; it exits when stdin is closed.
#[cfg(unix)]
fn ignore_termination_signals(cancel_token: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => debug!("Ignoring SIGINT, waiting for stdin to close"),
                _ = terminate.recv() => debug!("Ignoring SIGTERM, waiting for stdin to close"),
                _ = cancel_token.cancelled() => break,
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn ignore_termination_signals(cancel_token: CancellationToken) -> std::io::Result<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => debug!("Ignoring Ctrl-C, waiting for stdin to close"),
                _ = cancel_token.cancelled() => break,
            }
        }
    });
    Ok(())
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGBUCKET_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match cli::Args::parse().into_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let signal_cancel_token = CancellationToken::new();
    if let Err(e) = ignore_termination_signals(signal_cancel_token.clone()) {
        error!("Unable to install signal handlers: {e}");
        process::exit(1);
    }

    info!(
        "Counting lines into {} every {:?}",
        config.active_log().display(),
        config.dump_interval
    );
    let (service, handle) = BucketService::new(config);
    let service_task = tokio::spawn(service.run());

    match pump_lines(BufReader::new(io::stdin()), &handle).await {
        Ok(lines) => debug!("Input closed after {lines} lines"),
        Err(e) => error!("Error reading stdin: {e}"),
    }

    if let Err(e) = handle.stop().await {
        debug!("Bucket service already stopped: {e}");
    }
    drop(handle);
    signal_cancel_token.cancel();

    match service_task.await {
        Ok(Ok(())) => info!("Shut down cleanly"),
        Ok(Err(e)) => {
            error!("Fatal error: {e}");
            process::exit(1);
        }
        Err(e) => {
            error!("Bucket service task failed: {e}");
            process::exit(1);
        }
    }
}
