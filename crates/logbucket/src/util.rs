// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parsing of the numeric-with-suffix values accepted on the command line.

use crate::errors::ConfigError;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const KIB: u64 = 1024;

#[allow(clippy::expect_used)]
fn num_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+)([a-z]?)$").expect("invalid num suffix regex"))
}

/// Splits `"200m"` into `(200, Some('m'))`. `None` when the grammar does not match
/// or the number does not fit in a `u64`.
fn split_num_suffix(s: &str) -> Option<(u64, Option<char>)> {
    let captures = num_suffix_regex().captures(s)?;
    let value = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let suffix = captures.get(2).and_then(|m| m.as_str().chars().next());
    Some((value, suffix))
}

/// Parses a size such as `"200m"` into bytes.
///
/// Valid suffixes are `b`, `k`, `m`, `g`, or none (bytes). Multipliers are powers of 1024.
///
/// # Examples
///
/// ```
/// use logbucket::util::parse_max_size;
///
/// assert_eq!(parse_max_size("512"), Ok(512));
/// assert_eq!(parse_max_size("2k"), Ok(2048));
/// assert!(parse_max_size("2kb").is_err());
/// ```
pub fn parse_max_size(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidMaxSize(s.to_string());
    let (value, suffix) = split_num_suffix(s).ok_or_else(invalid)?;
    let multiplier = match suffix {
        None | Some('b') => 1,
        Some('k') => KIB,
        Some('m') => KIB * KIB,
        Some('g') => KIB * KIB * KIB,
        Some(_) => return Err(invalid()),
    };
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parses an interval such as `"5m"`.
///
/// Valid suffixes are `s`, `m`, `h`, or none (seconds).
pub fn parse_dump_interval(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDumpInterval(s.to_string());
    let (value, suffix) = split_num_suffix(s).ok_or_else(invalid)?;
    let seconds = match suffix {
        None | Some('s') => Some(value),
        Some('m') => value.checked_mul(60),
        Some('h') => value.checked_mul(60 * 60),
        Some(_) => None,
    };
    seconds.map(Duration::from_secs).ok_or_else(invalid)
}
