// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconcile request stamps.
//!
//! Stamps are RFC 3339 UTC timestamps with a fixed nine-digit fraction, so
//! lexical order equals chronological order. A stamper never hands out the
//! same or an older value twice, even when the wall clock stalls or steps back.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Default)]
pub struct ReconcileStamper {
    last_nanos: AtomicI64,
}

impl ReconcileStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp from the system clock.
    pub fn next(&self) -> String {
        self.next_from(Utc::now())
    }

    /// Next stamp no earlier than `now` and strictly after the previous one.
    pub fn next_from(&self, now: DateTime<Utc>) -> String {
        let wall = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut prev = self.last_nanos.load(Ordering::Relaxed);
        loop {
            let candidate = wall.max(prev.saturating_add(1));
            match self.last_nanos.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format_nanos(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Render epoch nanoseconds as `YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ`.
pub fn format_nanos(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
#[path = "stamp_tests.rs"]
mod tests;
