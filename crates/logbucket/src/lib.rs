// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counting log writer.
//!
//! Event lines (JSON objects) are counted in memory, written out periodically as one record per
//! distinct line, and the resulting log is rotated by size into a bounded, optionally compressed
//! backlog of generations.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod archiver;
pub mod bucket_service;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod rotator;
pub mod util;
