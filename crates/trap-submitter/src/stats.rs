// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::util::byte_size;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Counters {
    metrics: u64,
    sent_bytes: u64,
}

/// Submission counters shared by every task using an engine.
///
/// Both counters live behind one lock so a reader never sees bytes from a
/// submission whose metric count has not landed yet.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<Counters>,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub metrics: u64,
    pub sent_bytes: u64,
    pub sent_size: String,
}

#[allow(clippy::expect_used)]
impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts one confirmed delivery.
    pub fn record(&self, accepted: u64, bytes: u64) {
        let mut counters = self.inner.lock().expect("lock poisoned");
        counters.metrics += accepted;
        counters.sent_bytes += bytes;
    }

    pub fn reset(&self) {
        let mut counters = self.inner.lock().expect("lock poisoned");
        *counters = Counters::default();
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.inner.lock().expect("lock poisoned");
        StatsSnapshot {
            metrics: counters.metrics,
            sent_bytes: counters.sent_bytes,
            sent_size: byte_size(counters.sent_bytes),
        }
    }
}
