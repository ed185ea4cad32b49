// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-monitoring signals for the transport: per-attempt latency, retries,
//! failures and successful submissions. These describe the engine itself and are
//! independent of the metrics being forwarded.

use crate::constants::AGENT_NAME;
use crate::metric::{MetricSample, MetricType, Metrics};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Sink for transport signals. Called from every submitting task.
pub trait SelfMonitor: Send + Sync {
    /// Latency of one transport attempt, successful or not.
    fn record_latency(&self, latency: Duration);
    /// One attempt beyond the first.
    fn increment_retries(&self);
    /// One attempt answered with a non-200 status, whether or not it is retried.
    fn increment_errors(&self, status: u16);
    /// Terminal failure of a submission, tagged with the final status code if any.
    fn increment_failures(&self, status: Option<u16>);
    fn increment_submits(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl SelfMonitor for NoopMonitor {
    fn record_latency(&self, _latency: Duration) {}
    fn increment_retries(&self) {}
    fn increment_errors(&self, _status: u16) {}
    fn increment_failures(&self, _status: Option<u16>) {}
    fn increment_submits(&self) {}
}

/// Log-linear histogram bucket: decimal exponent and two significant digits
/// (10..=99). Non-positive samples share the zero bucket.
type Bin = (i32, i64);

const ZERO_BIN: Bin = (i32::MIN, 0);

/// In-process accumulator that can be flushed into the agent's own metric stream.
/// Latencies are kept as bucket counts, so memory is bounded by the number of
/// distinct buckets rather than the number of attempts.
#[derive(Debug, Default)]
pub struct InternalMetrics {
    submits: AtomicU64,
    retries: AtomicU64,
    errors: Mutex<BTreeMap<u16, u64>>,
    failures: Mutex<BTreeMap<Option<u16>, u64>>,
    latency_bins: Mutex<BTreeMap<Bin, u64>>,
}

#[allow(clippy::expect_used)]
impl SelfMonitor for InternalMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn record_latency(&self, latency: Duration) {
        let bin = bin_for(latency.as_micros() as f64 / 1000.0);
        *self
            .latency_bins
            .lock()
            .expect("lock poisoned")
            .entry(bin)
            .or_default() += 1;
    }

    fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_errors(&self, status: u16) {
        *self
            .errors
            .lock()
            .expect("lock poisoned")
            .entry(status)
            .or_default() += 1;
    }

    fn increment_failures(&self, status: Option<u16>) {
        *self
            .failures
            .lock()
            .expect("lock poisoned")
            .entry(status)
            .or_default() += 1;
    }

    fn increment_submits(&self) {
        self.submits.fetch_add(1, Ordering::Relaxed);
    }
}

#[allow(clippy::expect_used)]
impl InternalMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn submits(&self) -> u64 {
        self.submits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Non-200 answers received for `status`, counted per attempt.
    #[must_use]
    pub fn errors_for(&self, status: u16) -> u64 {
        self.errors
            .lock()
            .expect("lock poisoned")
            .get(&status)
            .copied()
            .unwrap_or_default()
    }

    /// Total failures across all status codes.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.lock().expect("lock poisoned").values().sum()
    }

    #[must_use]
    pub fn failures_for(&self, status: Option<u16>) -> u64 {
        self.failures
            .lock()
            .expect("lock poisoned")
            .get(&status)
            .copied()
            .unwrap_or_default()
    }

    /// Number of latency samples recorded since the last flush, one per attempt.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.latency_bins
            .lock()
            .expect("lock poisoned")
            .values()
            .sum()
    }

    /// Drains accumulated signals into trap metrics. Counters are cumulative and
    /// stamped with `timestamp_ms`; the latency histogram only covers samples since
    /// the previous flush and carries no timestamp.
    #[must_use]
    pub fn flush(&self, timestamp_ms: u64) -> Metrics {
        let mut metrics = Metrics::new();
        let ts = Some(timestamp_ms);

        metrics.insert(
            tagged("collect_submits", &[]),
            MetricSample::new(self.submits(), MetricType::Uint64, ts),
        );
        metrics.insert(
            tagged("collect_submit_retries", &[]),
            MetricSample::new(self.retries(), MetricType::Uint64, ts),
        );
        for (status, count) in self.errors.lock().expect("lock poisoned").iter() {
            metrics.insert(
                tagged("collect_submit_errors", &[("code", &status.to_string())]),
                MetricSample::new(*count, MetricType::Uint64, ts),
            );
        }
        for (status, count) in self.failures.lock().expect("lock poisoned").iter() {
            let name = match status {
                Some(code) => tagged("collect_submit_fails", &[("code", &code.to_string())]),
                None => tagged("collect_submit_fails", &[]),
            };
            metrics.insert(name, MetricSample::new(*count, MetricType::Uint64, ts));
        }

        let bins = std::mem::take(&mut *self.latency_bins.lock().expect("lock poisoned"));
        if !bins.is_empty() {
            metrics.insert(
                tagged(
                    "collect_latency",
                    &[("type", "submit"), ("units", "milliseconds")],
                ),
                MetricSample::new(render_bins(&bins), MetricType::Histogram, ts),
            );
        }
        metrics
    }
}

/// Stream-tagged metric name, e.g. `collect_submits|ST[source:trap-submitter]`.
fn tagged(name: &str, tags: &[(&str, &str)]) -> String {
    let mut all: Vec<String> = tags.iter().map(|(k, v)| format!("{k}:{v}")).collect();
    all.push(format!("source:{AGENT_NAME}"));
    all.sort();
    format!("{name}|ST[{}]", all.join(","))
}

#[allow(clippy::cast_possible_truncation)]
fn bin_for(sample: f64) -> Bin {
    if sample <= 0.0 || !sample.is_finite() {
        return ZERO_BIN;
    }
    let exp = sample.log10().floor() as i32;
    let mantissa = (sample / 10f64.powi(exp - 1)).floor() as i64;
    // floating error can land exactly on 100
    if mantissa >= 100 {
        (exp + 1, 10)
    } else {
        (exp, mantissa.max(10))
    }
}

/// Renders bins as `H[1.2e+02]=count`.
fn render_bins(bins: &BTreeMap<Bin, u64>) -> Vec<String> {
    bins.iter()
        .map(|(&(exp, mantissa), count)| {
            if (exp, mantissa) == ZERO_BIN {
                format!("H[0]={count}")
            } else {
                let sign = if exp < 0 { '-' } else { '+' };
                format!(
                    "H[{}.{}e{sign}{:02}]={count}",
                    mantissa / 10,
                    mantissa % 10,
                    exp.abs()
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counters() {
        let monitor = InternalMetrics::new();
        monitor.increment_submits();
        monitor.increment_retries();
        monitor.increment_retries();
        monitor.increment_failures(Some(503));
        monitor.increment_failures(None);
        monitor.record_latency(Duration::from_millis(5));

        assert_eq!(monitor.submits(), 1);
        assert_eq!(monitor.retries(), 2);
        assert_eq!(monitor.failures(), 2);
        assert_eq!(monitor.failures_for(Some(503)), 1);
        assert_eq!(monitor.attempts(), 1);
    }

    #[test]
    fn test_histogram_bins() {
        let mut bins: BTreeMap<Bin, u64> = BTreeMap::new();
        for sample in [123.0, 129.9, 5.0, 0.0, 0.25] {
            *bins.entry(bin_for(sample)).or_default() += 1;
        }
        assert_eq!(
            render_bins(&bins),
            vec![
                "H[0]=1".to_string(),
                "H[2.5e-01]=1".to_string(),
                "H[5.0e+00]=1".to_string(),
                "H[1.2e+02]=2".to_string(),
            ]
        );
    }

    #[test]
    fn test_flush_builds_metrics_and_drains_latency() {
        let monitor = InternalMetrics::new();
        monitor.increment_submits();
        monitor.increment_failures(Some(404));
        monitor.record_latency(Duration::from_millis(12));

        let metrics = monitor.flush(1_000);
        let submits = &metrics["collect_submits|ST[source:trap-submitter]"];
        assert_eq!(submits.value, json!(1));
        assert_eq!(submits.timestamp, Some(1_000));
        assert!(metrics.contains_key("collect_submit_fails|ST[code:404,source:trap-submitter]"));

        let latency = &metrics
            ["collect_latency|ST[source:trap-submitter,type:submit,units:milliseconds]"];
        assert_eq!(latency.metric_type, MetricType::Histogram);
        assert_eq!(latency.timestamp, None);
        assert_eq!(latency.value, json!(["H[1.2e+01]=1"]));

        assert_eq!(monitor.attempts(), 0);
        let metrics = monitor.flush(2_000);
        assert!(!metrics.keys().any(|k| k.starts_with("collect_latency")));
    }

    #[test]
    fn test_latency_storage_is_bounded_by_bins() {
        let monitor = InternalMetrics::new();
        for i in 0..100_000u64 {
            // 1ms..=10ms in 1µs steps, then repeats
            monitor.record_latency(Duration::from_micros(1_000 + i % 9_001));
        }

        let distinct: std::collections::BTreeSet<Bin> = (0..9_001u64)
            .map(|us| bin_for((1_000 + us) as f64 / 1000.0))
            .collect();
        assert_eq!(
            monitor.latency_bins.lock().expect("lock").len(),
            distinct.len()
        );
        assert!(distinct.len() <= 91);
        assert_eq!(monitor.attempts(), 100_000);
    }

    #[test]
    fn test_errors_are_counted_per_status() {
        let monitor = InternalMetrics::new();
        monitor.increment_errors(503);
        monitor.increment_errors(503);
        monitor.increment_errors(429);

        assert_eq!(monitor.errors_for(503), 2);
        assert_eq!(monitor.errors_for(429), 1);
        assert_eq!(monitor.errors_for(500), 0);

        let metrics = monitor.flush(1_000);
        assert_eq!(
            metrics["collect_submit_errors|ST[code:503,source:trap-submitter]"].value,
            json!(2)
        );
        assert_eq!(
            metrics["collect_submit_errors|ST[code:429,source:trap-submitter]"].value,
            json!(1)
        );
    }
}
