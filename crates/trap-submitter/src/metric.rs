// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire representation of metric samples sent to a trap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to sample. Ordered so trace dumps of consecutive submissions diff cleanly.
pub type Metrics = BTreeMap<String, MetricSample>;

/// Type tag understood by the trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    #[serde(rename = "i")]
    Int32,
    #[serde(rename = "I")]
    Uint32,
    #[serde(rename = "l")]
    Int64,
    #[serde(rename = "L")]
    Uint64,
    #[serde(rename = "n")]
    Double,
    #[serde(rename = "s")]
    Text,
    #[serde(rename = "h")]
    Histogram,
}

impl MetricType {
    #[must_use]
    pub fn is_histogram(self) -> bool {
        matches!(self, Self::Histogram)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(rename = "_value")]
    pub value: serde_json::Value,
    #[serde(rename = "_type")]
    pub metric_type: MetricType,
    /// Milliseconds since the epoch.
    #[serde(rename = "_ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl MetricSample {
    /// Builds a sample, discarding `timestamp` for histograms: the trap places
    /// distribution samples in time itself.
    pub fn new(
        value: impl Into<serde_json::Value>,
        metric_type: MetricType,
        timestamp: Option<u64>,
    ) -> Self {
        Self {
            value: value.into(),
            metric_type,
            timestamp: if metric_type.is_histogram() {
                None
            } else {
                timestamp
            },
        }
    }
}
