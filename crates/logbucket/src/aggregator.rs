// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory occurrence counts of event lines.
//!
//! Every input line is expected to be a JSON object. Its opening brace is dropped and the rest of
//! the line, verbatim, is the aggregation key. On flush each key is written back as a JSON object
//! whose first two fields are the count and the flush timestamp:
//!
//! ```text
//! {"x":5}  {"x":5}  {"x":5}      ->      {"count":3,"ts":"2024-05-01T10:00:00Z","x":5}
//! ```

use chrono::{SecondsFormat, Utc};
use fnv::FnvHasher;
use hashbrown::HashMap;
use std::hash::BuildHasherDefault;

type Table = HashMap<String, u64, BuildHasherDefault<FnvHasher>>;

#[derive(Debug, Default)]
pub struct Aggregator {
    counts: Table,
}

/// Returns the aggregation key of an event line: the line without its first character.
///
/// The first character is not checked, it is assumed to be `{`. An empty line has the empty key.
#[must_use]
pub fn event_key(line: &str) -> &str {
    let mut chars = line.chars();
    chars.next();
    chars.as_str()
}

/// Current time in the record timestamp format (RFC3339, UTC, second precision).
#[must_use]
pub fn flush_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: &str) {
        let key = event_key(line);
        // get_mut first so repeated keys do not allocate
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
        } else {
            self.counts.insert(key.to_owned(), 1);
        }
    }

    #[must_use]
    pub fn count(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Swaps in an empty table and returns the counts gathered so far.
    pub fn take(&mut self) -> Aggregator {
        Aggregator {
            counts: std::mem::take(&mut self.counts),
        }
    }

    /// Serializes every entry as one line, in a single buffer ready to be appended.
    #[must_use]
    pub fn render(&self, timestamp: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.counts.len() * 64);
        for (key, count) in &self.counts {
            let line = format!("{{\"count\":{count},\"ts\":\"{timestamp}\",{key}\n");
            buf.extend_from_slice(line.as_bytes());
        }
        buf
    }
}
