// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Max size of the active log before it is rotated (200 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 200 * 1024 * 1024;
pub const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ROTATE_COUNT: u32 = 9;
pub const DEFAULT_LOG_EXTENSION: &str = "log";
pub const DEFAULT_COMPRESSED_EXTENSION: &str = "xz";
pub const DEFAULT_COMPRESS_PROGRAM: &str = "/usr/bin/xz";

/// Number of lines buffered between the producer and the control loop.
/// A full queue makes `BucketHandle::record` wait.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;
