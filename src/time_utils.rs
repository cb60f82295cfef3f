// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for epoch-millisecond timestamps.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Cutoff `days` before now, in epoch milliseconds.
pub fn days_ago_millis(days: u32) -> i64 {
    (Utc::now() - Duration::days(i64::from(days))).timestamp_millis()
}

/// Format epoch milliseconds as RFC3339 using a `Z` suffix.
pub fn format_millis_rfc3339(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Whole seconds elapsed between two epoch-millisecond instants.
pub fn elapsed_seconds(start_millis: i64, end_millis: i64) -> i64 {
    (end_millis - start_millis) / 1000
}
