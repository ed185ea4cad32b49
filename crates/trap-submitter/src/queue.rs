// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serialized delivery: a bounded FIFO drained by a single worker, so at most one
//! submission is in flight towards the trap at any time.

use crate::engine::Submitter;
use crate::errors::SubmitError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument, Span};

/// An encoded payload waiting for the worker, with the span of the collection
/// that produced it so the worker's log lines are attributed to that collection.
#[derive(Debug)]
pub struct QueuedSubmission {
    pub payload: Vec<u8>,
    pub span: Span,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SubmissionQueue {
    tx: mpsc::Sender<QueuedSubmission>,
}

impl SubmissionQueue {
    /// Pushes a payload, waiting for room when the queue is full. Returning `Ok`
    /// means the payload was accepted, not delivered.
    pub async fn enqueue(&self, payload: Vec<u8>, span: Span) -> Result<(), SubmitError> {
        if payload.is_empty() {
            return Err(SubmitError::InvalidInput("empty"));
        }
        self.tx
            .send(QueuedSubmission { payload, span })
            .await
            .map_err(|_| SubmitError::QueueClosed)
    }

    /// Pushes a payload without waiting.
    pub fn try_enqueue(&self, payload: Vec<u8>, span: Span) -> Result<(), SubmitError> {
        if payload.is_empty() {
            return Err(SubmitError::InvalidInput("empty"));
        }
        self.tx
            .try_send(QueuedSubmission { payload, span })
            .map_err(|e| match e {
                TrySendError::Full(_) => SubmitError::QueueFull,
                TrySendError::Closed(_) => SubmitError::QueueClosed,
            })
    }

    /// Payloads accepted but not yet picked up by the worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side of the queue.
pub struct SubmissionWorker {
    rx: mpsc::Receiver<QueuedSubmission>,
    submitter: Submitter,
    cancel: CancellationToken,
}

/// Creates a queue of `capacity` payloads and the worker draining it. The worker
/// stops once `cancel` fires or every queue handle is dropped.
#[must_use]
pub fn channel(
    capacity: usize,
    submitter: Submitter,
    cancel: CancellationToken,
) -> (SubmissionQueue, SubmissionWorker) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        SubmissionQueue { tx },
        SubmissionWorker {
            rx,
            submitter,
            cancel,
        },
    )
}

impl SubmissionWorker {
    pub async fn run(mut self) {
        debug!("Submission worker started");

        loop {
            let item = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                item = self.rx.recv() => item,
            };
            let Some(QueuedSubmission { payload, span }) = item else {
                break;
            };

            // The in-flight submission gets its own token: stopping the worker
            // must not abort a delivery halfway through.
            let result = self
                .submitter
                .submit_payload(payload, &CancellationToken::new())
                .instrument(span.clone())
                .await;
            if let Err(e) = result {
                span.in_scope(|| error!("Failed to submit metric set: {e}"));
            }
        }

        debug!("Submission worker stopped");
    }
}
