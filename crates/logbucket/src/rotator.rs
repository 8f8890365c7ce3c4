// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::archiver::ArchiverHandle;
use crate::config::BucketConfig;
use crate::errors::BucketError;
use crate::flusher::Flusher;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Swaps the active log for an empty one and hands the old file to the archiver.
///
/// Waits for the previous archive pass first, so a slow archiver stalls the caller instead of
/// letting two passes shift the backlog at once. Every failure here is fatal.
pub async fn rotate(
    config: &BucketConfig,
    flusher: &mut Flusher,
    archiver: &ArchiverHandle,
) -> Result<(), BucketError> {
    let slot = archiver.reserve().await?;

    flusher.close().await;
    let transient = config.transient_log(unix_now());
    fs::rename(flusher.path(), &transient)
        .await
        .map_err(|source| BucketError::Rename {
            from: flusher.path().to_path_buf(),
            to: transient.clone(),
            source,
        })?;
    flusher.reopen().await?;
    info!(
        "Rotated {} into {}",
        flusher.path().display(),
        transient.display()
    );

    if config.rotate_count == 0 {
        debug!("Rotate count is 0, dropping {}", transient.display());
        slot.discard(&transient).await;
        return Ok(());
    }
    slot.submit(transient).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::ArchiverService;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir, rotate_count: u32) -> Arc<BucketConfig> {
        Arc::new(BucketConfig {
            log_path: dir.path().to_path_buf(),
            log_name: "events".to_string(),
            rotate_count,
            compress_program: None,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_rotate_installs_generation_one() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&dir, 2);
        let (service, archiver) = ArchiverService::new(Arc::clone(&config));
        let worker = tokio::spawn(service.run());

        let mut flusher = Flusher::open(&config).await.expect("Failed to open");
        flusher.append(b"before\n").await;

        rotate(&config, &mut flusher, &archiver)
            .await
            .expect("rotate failed");
        assert_eq!(flusher.bytes_written(), 0);
        assert_eq!(flusher.path(), config.active_log());

        flusher.append(b"after\n").await;
        archiver.wait_idle().await.expect("archiver gone");

        assert_eq!(
            std::fs::read_to_string(config.active_log()).unwrap(),
            "after\n"
        );
        assert_eq!(
            std::fs::read_to_string(config.generation_log(1, false)).unwrap(),
            "before\n"
        );

        drop(archiver);
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rotate_without_retention_drops_old_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&dir, 0);
        let (_service, archiver) = ArchiverService::new(Arc::clone(&config));

        let mut flusher = Flusher::open(&config).await.expect("Failed to open");
        flusher.append(b"before\n").await;

        rotate(&config, &mut flusher, &archiver)
            .await
            .expect("rotate failed");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries, vec![config.active_log()]);
        assert_eq!(std::fs::metadata(config.active_log()).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rotate_fails_when_active_log_vanished() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&dir, 2);
        let (_service, archiver) = ArchiverService::new(Arc::clone(&config));

        let mut flusher = Flusher::open(&config).await.expect("Failed to open");
        std::fs::remove_file(config.active_log()).unwrap();

        let result = rotate(&config, &mut flusher, &archiver).await;
        assert!(matches!(result, Err(BucketError::Rename { .. })));
    }
}
