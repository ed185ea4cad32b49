// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Submission pipeline and delivery modes.
//!
//! [`Submitter`] runs one payload through encode, trace, request, retry and
//! accounting. [`Engine`] is what collectors talk to: it picks between
//! submitting on the caller's task and handing the payload to the queue worker,
//! based on the configuration it was built with.

use crate::config::SubmitterConfig;
use crate::encoder::{encode_metrics, write_trace, Payload, SizeHint};
use crate::errors::SubmitError;
use crate::guard::CycleGuard;
use crate::metric::Metrics;
use crate::monitor::{InternalMetrics, SelfMonitor};
use crate::queue::{self, SubmissionQueue, SubmissionWorker};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::{build_client, send_with_retry};
use crate::trap::{build_request, parse_response, render_request, TrapResult};
use crate::util::byte_size;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument, Span};
use uuid::Uuid;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Result of handing a payload to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The trap accepted the submission.
    Delivered(TrapResult),
    /// Accepted by the queue; delivery happens on the worker.
    Queued,
    /// No submission URL: the payload was written to the local sink.
    DryRun { bytes: usize },
}

/// In-memory sink, handy for capturing dry-run output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

#[allow(clippy::expect_used)]
impl SharedBuffer {
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().expect("lock poisoned").clone()
    }
}

#[allow(clippy::expect_used)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("lock poisoned").write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs payloads through the full submission pipeline. Clones share stats,
/// monitor and sink.
#[derive(Clone)]
pub struct Submitter {
    config: Arc<SubmitterConfig>,
    stats: Arc<Stats>,
    monitor: Arc<dyn SelfMonitor>,
    sink: Sink,
}

#[allow(clippy::expect_used)]
impl Submitter {
    #[must_use]
    pub fn new(config: Arc<SubmitterConfig>, monitor: Arc<dyn SelfMonitor>) -> Self {
        Self {
            config,
            stats: Arc::new(Stats::new()),
            monitor,
            sink: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
        }
    }

    /// Replaces the local sink used for dry runs and request dumps (stdout by default).
    #[must_use]
    pub fn with_sink(self, sink: impl Write + Send + 'static) -> Self {
        *self.sink.lock().expect("lock poisoned") = Box::new(sink);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Delivers one encoded payload. Stats are only touched once the trap has
    /// confirmed the submission and its response parsed.
    pub async fn submit_payload(
        &self,
        raw: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, SubmitError> {
        if raw.is_empty() {
            return Err(SubmitError::InvalidInput("empty"));
        }
        let Some(url) = self.config.submission_url() else {
            return self.dry_run(&raw);
        };

        let start = Instant::now();
        let submit_uuid = Uuid::new_v4();

        let payload = Payload::prepare(
            raw,
            self.config.use_compression,
            self.config.compression_threshold,
        )
        .inspect_err(|e| error!("Failed to prepare payload: {e}"))?;

        if let Some(dir) = &self.config.trace_submits {
            let (dir, traced) = (dir.clone(), payload.clone());
            // blocking file I/O stays off the runtime workers
            if let Err(e) =
                tokio::task::spawn_blocking(move || write_trace(&dir, &submit_uuid, &traced)).await
            {
                error!(%submit_uuid, "Submit trace task failed: {e}");
            }
        }

        if self.config.debug_submissions {
            let dump = render_request(url, &payload, &submit_uuid);
            self.write_sink(format!("{dump}\n").as_bytes())?;
        }

        let client = build_client(&self.config)
            .inspect_err(|e| error!("Failed to create http client: {e}"))?;
        let request = build_request(&client, url, &payload, &submit_uuid);

        let delivered = send_with_retry(
            &request,
            url,
            &self.config.retry,
            self.monitor.as_ref(),
            cancel,
        )
        .await
        .inspect_err(|e| error!(%submit_uuid, "Failed to submit metrics: {e}"))?;
        // dropping the only client closes its idle connections
        drop(request);
        drop(client);

        self.monitor.increment_submits();

        let result = parse_response(&self.config.check_uuid, submit_uuid, &delivered.body)
            .inspect_err(|e| error!(%submit_uuid, "Failed to parse trap response: {e}"))?;
        if let Some(trap_error) = &result.error {
            warn!(%submit_uuid, "Trap reported an error: {trap_error}");
        }

        debug!(
            %submit_uuid,
            duration = ?start.elapsed(),
            attempts = delivered.attempts,
            accepted = result.stats,
            filtered = result.filtered,
            bytes_sent = %byte_size(payload.len() as u64),
            "submitted"
        );
        self.stats.record(result.stats, payload.len() as u64);

        Ok(Outcome::Delivered(result))
    }

    fn dry_run(&self, raw: &[u8]) -> Result<Outcome, SubmitError> {
        self.write_sink(raw)?;
        Ok(Outcome::DryRun { bytes: raw.len() })
    }

    fn write_sink(&self, data: &[u8]) -> Result<(), SubmitError> {
        let mut sink = self.sink.lock().expect("lock poisoned");
        sink.write_all(data).map_err(SubmitError::DryRun)?;
        sink.flush().map_err(SubmitError::DryRun)
    }
}

/// How payloads reach the trap.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Submit on the calling task; submissions from different callers may overlap.
    Direct,
    /// Hand off to the single queue worker; strictly one submission at a time, FIFO.
    Queued(SubmissionQueue),
}

/// Entry point for collectors.
pub struct Engine {
    submitter: Submitter,
    delivery: Delivery,
    size_hint: SizeHint,
    flush_guard: CycleGuard,
}

impl Engine {
    /// Builds an engine around `submitter`. In serialized mode the returned worker
    /// must be spawned (`tokio::spawn(worker.run())`); it runs until
    /// `worker_cancel` fires or the engine is dropped.
    pub fn new(
        submitter: Submitter,
        worker_cancel: CancellationToken,
    ) -> Result<(Self, Option<SubmissionWorker>), SubmitError> {
        submitter.config().validate()?;

        let (delivery, worker) = if submitter.config().concurrent_submissions {
            (Delivery::Direct, None)
        } else {
            let (queue, worker) = queue::channel(
                submitter.config().queue_capacity,
                submitter.clone(),
                worker_cancel,
            );
            (Delivery::Queued(queue), Some(worker))
        };

        let engine = Self {
            submitter,
            delivery,
            size_hint: SizeHint::default(),
            flush_guard: CycleGuard::new(),
        };
        Ok((engine, worker))
    }

    #[must_use]
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Encodes `metrics` and delivers them according to the delivery mode.
    pub async fn submit(
        &self,
        metrics: &Metrics,
        span: Span,
        cancel: &CancellationToken,
    ) -> Result<Outcome, SubmitError> {
        let data = span.in_scope(|| {
            encode_metrics(metrics, &self.size_hint)
                .inspect_err(|e| warn!("Failed to encode metrics: {e}"))
        })?;
        self.deliver(data, span, cancel).await
    }

    /// Delivers bytes already in wire format according to the delivery mode.
    pub async fn submit_stream(
        &self,
        data: Vec<u8>,
        span: Span,
        cancel: &CancellationToken,
    ) -> Result<Outcome, SubmitError> {
        self.deliver(data, span, cancel).await
    }

    /// Pushes bytes onto the serialized queue, waiting for room if it is full.
    pub async fn enqueue(&self, data: Vec<u8>, span: Span) -> Result<(), SubmitError> {
        match &self.delivery {
            Delivery::Queued(queue) => queue.enqueue(data, span).await,
            Delivery::Direct => Err(SubmitError::InvalidConfig(
                "enqueue requires serialized submissions".to_string(),
            )),
        }
    }

    async fn deliver(
        &self,
        data: Vec<u8>,
        span: Span,
        cancel: &CancellationToken,
    ) -> Result<Outcome, SubmitError> {
        match &self.delivery {
            Delivery::Direct => {
                self.submitter
                    .submit_payload(data, cancel)
                    .instrument(span)
                    .await
            }
            Delivery::Queued(queue) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(SubmitError::Cancelled),
                    result = queue.enqueue(data, span) => result.map(|()| Outcome::Queued),
                }
            }
        }
    }

    /// Submits the engine's own transport metrics. Skipped, returning `None`, when a
    /// previous flush is still running.
    #[allow(clippy::cast_sign_loss)]
    pub async fn flush_internal_metrics(
        &self,
        internal: &InternalMetrics,
        cancel: &CancellationToken,
    ) -> Result<Option<Outcome>, SubmitError> {
        let Some(_token) = self.flush_guard.try_enter() else {
            warn!("Internal metrics flush already running");
            return Ok(None);
        };
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let metrics = internal.flush(timestamp);
        self.submit(&metrics, Span::current(), cancel)
            .await
            .map(Some)
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.submitter.stats().snapshot()
    }

    pub fn reset_stats(&self) {
        self.submitter.stats().reset();
    }
}
