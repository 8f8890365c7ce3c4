// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use logbucket::{
    bucket_service::{BucketHandle, BucketService},
    config::BucketConfig,
    errors::BucketError,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

fn config_for(dir: &Path, max_size: u64, rotate_count: u32) -> BucketConfig {
    BucketConfig {
        log_path: dir.to_path_buf(),
        log_name: "events".to_string(),
        max_size,
        rotate_count,
        compress_program: None,
        dump_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

fn start(config: BucketConfig) -> (BucketHandle, JoinHandle<Result<(), BucketError>>) {
    let (service, handle) = BucketService::new(Arc::new(config));
    (handle, tokio::spawn(service.run()))
}

fn read(dir: &Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap_or_else(|e| panic!("{file}: {e}"))
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("unable to list log dir")
        .map(|entry| entry.expect("bad entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn flush_over_threshold_rotates_into_generation_one() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (handle, task) = start(config_for(dir.path(), 10, 3));

    handle.record("{\"a\":1".to_string()).await.unwrap();
    let report = handle.flush().await.expect("Failed to flush");
    assert!(report.bytes >= 10);
    assert!(report.rotated);

    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    assert_eq!(read(dir.path(), "events.log"), "");
    let first = read(dir.path(), "events.1.log");
    assert_eq!(first.lines().count(), 1);
    assert!(first.starts_with("{\"count\":1,\"ts\":\""));
    assert!(first.ends_with("\",\"a\":1\n"));
    assert_eq!(file_names(dir.path()), vec!["events.1.log", "events.log"]);
}

#[tokio::test]
async fn retention_keeps_most_recent_generations() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (handle, task) = start(config_for(dir.path(), 10, 2));

    for rotation in 1..=3 {
        handle
            .record(format!("{{\"rotation\":{rotation}"))
            .await
            .unwrap();
        let report = handle.flush().await.expect("Failed to flush");
        assert!(report.rotated, "rotation {rotation} did not happen");
    }

    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    assert!(read(dir.path(), "events.1.log").ends_with(",\"rotation\":3\n"));
    assert!(read(dir.path(), "events.2.log").ends_with(",\"rotation\":2\n"));
    assert_eq!(
        file_names(dir.path()),
        vec!["events.1.log", "events.2.log", "events.log"]
    );
}

#[tokio::test]
async fn duplicate_lines_collapse_into_one_record() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (handle, task) = start(config_for(dir.path(), 1024 * 1024, 2));

    for _ in 0..3 {
        handle.record("{\"x\":5".to_string()).await.unwrap();
    }
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    let log = read(dir.path(), "events.log");
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("{\"count\":3,\"ts\":\""));
    assert!(log.ends_with("\",\"x\":5\n"));
}

#[tokio::test]
async fn counts_restart_after_each_flush() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (handle, task) = start(config_for(dir.path(), 1024 * 1024, 2));

    handle.record("{\"k\":1}".to_string()).await.unwrap();
    handle.record("{\"k\":1}".to_string()).await.unwrap();
    handle.flush().await.expect("Failed to flush");
    handle.record("{\"k\":1}".to_string()).await.unwrap();
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    let log = read(dir.path(), "events.log");
    let counts: Vec<&str> = log
        .lines()
        .map(|line| line.split(',').next().unwrap_or_default())
        .collect();
    assert_eq!(counts, vec!["{\"count\":2", "{\"count\":1"]);
}

#[tokio::test]
async fn restart_appends_to_existing_log() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let (handle, task) = start(config_for(dir.path(), 1024 * 1024, 2));
    handle.record("{\"run\":1}".to_string()).await.unwrap();
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    let (handle, task) = start(config_for(dir.path(), 1024 * 1024, 2));
    handle.record("{\"run\":2}".to_string()).await.unwrap();
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    let log = read(dir.path(), "events.log");
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("\"run\":1}"));
    assert!(log.contains("\"run\":2}"));
}

#[tokio::test]
async fn zero_retention_keeps_only_active_log() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (handle, task) = start(config_for(dir.path(), 10, 0));

    for rotation in 1..=2 {
        handle
            .record(format!("{{\"rotation\":{rotation}"))
            .await
            .unwrap();
        assert!(handle.flush().await.expect("Failed to flush").rotated);
    }
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    assert_eq!(file_names(dir.path()), vec!["events.log"]);
    assert_eq!(read(dir.path(), "events.log"), "");
}

#[tokio::test]
async fn producers_share_one_service() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = BucketConfig {
        channel_capacity: 4,
        ..config_for(dir.path(), 1024 * 1024, 2)
    };
    let (handle, task) = start(config);

    let mut producers = Vec::new();
    for _ in 0..4 {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            for _ in 0..50 {
                handle.record("{\"shared\":true}".to_string()).await.unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    handle.stop().await.expect("Failed to stop");
    task.await.unwrap().expect("service failed");

    let log = read(dir.path(), "events.log");
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("{\"count\":200,"));
}
