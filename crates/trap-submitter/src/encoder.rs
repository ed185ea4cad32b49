// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns metrics into the exact bytes put on the wire.
//!
//! Encoding is JSON, compression is gzip and only kicks in above the configured
//! threshold: below it the gzip header and dictionary overhead cost more than they
//! save. When a trace directory is configured, the final wire bytes are also
//! dumped to disk for offline debugging.

use crate::constants::{DEFAULT_BUFFER_SIZE, TRACE_TS_FORMAT};
use crate::errors::SubmitError;
use crate::metric::Metrics;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};
use uuid::Uuid;

/// Remembers the size of the last encoded payload so the next buffer can be
/// allocated once instead of growing repeatedly.
#[derive(Debug)]
pub struct SizeHint(AtomicUsize);

impl Default for SizeHint {
    fn default() -> Self {
        Self(AtomicUsize::new(DEFAULT_BUFFER_SIZE))
    }
}

impl SizeHint {
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn update(&self, len: usize) {
        self.0.store(len, Ordering::Relaxed);
    }
}

/// Serializes a metric map to indented JSON.
pub fn encode_metrics(metrics: &Metrics, hint: &SizeHint) -> Result<Vec<u8>, SubmitError> {
    if metrics.is_empty() {
        return Err(SubmitError::InvalidInput("empty"));
    }
    let mut buf = Vec::with_capacity(hint.get());
    serde_json::to_writer_pretty(&mut buf, metrics)?;
    hint.update(buf.len());
    Ok(buf)
}

/// Bytes ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
    pub compressed: bool,
    /// Size before compression.
    pub raw_len: usize,
}

impl Payload {
    /// Gzips `raw` iff `use_compression` is set and `raw` is larger than `threshold`.
    pub fn prepare(
        raw: Vec<u8>,
        use_compression: bool,
        threshold: usize,
    ) -> Result<Self, SubmitError> {
        if raw.is_empty() {
            return Err(SubmitError::InvalidInput("empty"));
        }
        let raw_len = raw.len();
        if !use_compression || raw_len <= threshold {
            return Ok(Self {
                body: raw,
                compressed: false,
                raw_len,
            });
        }

        let body = gzip(&raw)?;
        debug!("Compressed payload from {raw_len} to {} bytes", body.len());
        Ok(Self {
            body,
            compressed: true,
            raw_len,
        })
    }

    /// Wire size of the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Trace dump filename: `<UTC timestamp>_<submit uuid>.json[.gz]`.
#[must_use]
pub fn trace_file_name(submit_uuid: &Uuid, compressed: bool) -> String {
    let mut name = format!(
        "{}_{}.json",
        chrono::Utc::now().format(TRACE_TS_FORMAT),
        submit_uuid
    );
    if compressed {
        name.push_str(".gz");
    }
    name
}

/// Writes the wire bytes of `payload` under `dir`. Failures are logged and
/// otherwise ignored; the returned path is only for diagnostics.
pub fn write_trace(dir: &Path, submit_uuid: &Uuid, payload: &Payload) -> Option<PathBuf> {
    let path = dir.join(trace_file_name(submit_uuid, payload.compressed));
    match std::fs::write(&path, &payload.body) {
        Ok(()) => {
            debug!("Wrote submit trace {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Skipping submit trace {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricSample, MetricType};
    use flate2::read::GzDecoder;
    use proptest::prelude::*;
    use std::io::Read;
    use tracing_test::traced_test;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).expect("valid gzip");
        out
    }

    #[test]
    fn test_encode_metrics_updates_hint() {
        let hint = SizeHint::default();
        let mut metrics = Metrics::new();
        metrics.insert(
            "cpu".to_string(),
            MetricSample::new(0.5, MetricType::Double, Some(1)),
        );

        let encoded = encode_metrics(&metrics, &hint).expect("encode");
        assert_eq!(hint.get(), encoded.len());
        let decoded: Metrics = serde_json::from_slice(&encoded).expect("decode");
        assert_eq!(decoded, metrics);
    }

    #[test]
    fn test_encode_empty_metrics_is_rejected() {
        let hint = SizeHint::default();
        assert!(matches!(
            encode_metrics(&Metrics::new(), &hint),
            Err(SubmitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_prepare_empty_is_rejected() {
        assert!(matches!(
            Payload::prepare(Vec::new(), true, 1024),
            Err(SubmitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_prepare_at_threshold_is_not_compressed() {
        let raw = vec![b'a'; 1024];
        let payload = Payload::prepare(raw.clone(), true, 1024).expect("prepare");
        assert!(!payload.compressed);
        assert_eq!(payload.body, raw);
    }

    #[test]
    fn test_prepare_over_threshold_is_compressed() {
        let raw = vec![b'a'; 1025];
        let payload = Payload::prepare(raw.clone(), true, 1024).expect("prepare");
        assert!(payload.compressed);
        assert_eq!(payload.raw_len, 1025);
        assert!(payload.len() < 1025);
        assert_eq!(gunzip(&payload.body), raw);
    }

    #[test]
    fn test_prepare_compression_disabled() {
        let raw = vec![b'a'; 4096];
        let payload = Payload::prepare(raw.clone(), false, 1024).expect("prepare");
        assert!(!payload.compressed);
        assert_eq!(payload.body, raw);
    }

    #[test]
    fn test_trace_file_name() {
        let id = Uuid::new_v4();
        let plain = trace_file_name(&id, false);
        assert!(plain.ends_with(&format!("_{id}.json")));
        // 20060102_150405.000000000
        assert_eq!(plain.find('_'), Some(8));
        assert!(trace_file_name(&id, true).ends_with(".json.gz"));
    }

    #[test]
    fn test_write_trace_writes_wire_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = Uuid::new_v4();
        let payload = Payload::prepare(vec![b'x'; 2048], true, 1024).expect("prepare");

        let path = write_trace(dir.path(), &id, &payload).expect("trace written");
        assert!(path.to_string_lossy().ends_with(".json.gz"));
        assert_eq!(std::fs::read(path).expect("read trace"), payload.body);
    }

    #[test]
    #[traced_test]
    fn test_write_trace_failure_is_swallowed() {
        let id = Uuid::new_v4();
        let payload = Payload::prepare(b"{}".to_vec(), false, 1024).expect("prepare");
        assert!(write_trace(Path::new("/nonexistent/trace/dir"), &id, &payload).is_none());
        assert!(logs_contain("Skipping submit trace"));
    }

    proptest! {
        #[test]
        fn small_payloads_are_sent_verbatim(
            raw in proptest::collection::vec(any::<u8>(), 1..=1024),
            use_compression in any::<bool>(),
        ) {
            let payload = Payload::prepare(raw.clone(), use_compression, 1024).expect("prepare");
            prop_assert!(!payload.compressed);
            prop_assert_eq!(payload.body, raw);
        }

        #[test]
        fn large_payloads_round_trip_through_gzip(
            raw in proptest::collection::vec(any::<u8>(), 1025..4096),
        ) {
            let payload = Payload::prepare(raw.clone(), true, 1024).expect("prepare");
            prop_assert!(payload.compressed);
            prop_assert_eq!(gunzip(&payload.body), raw);
        }
    }
}
