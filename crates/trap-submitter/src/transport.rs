// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport and retry controller.
//!
//! A client is built per submission and dropped when the submission ends, which
//! closes its idle connections: submissions arrive in short bursts once per
//! collection cycle, so pooled connections would sit idle most of the time.

use crate::config::SubmitterConfig;
use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT_MAX, DEFAULT_RETRY_WAIT_MIN};
use crate::errors::SubmitError;
use crate::monitor::SelfMonitor;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trap_fips::create_reqwest_client_builder;

/// Exponential backoff: the first retry waits `min_wait`, each following retry
/// doubles the wait up to `max_wait`, and at most `max_retries` retries follow
/// the initial attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_wait: DEFAULT_RETRY_WAIT_MIN,
            max_wait: DEFAULT_RETRY_WAIT_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.min_wait
            .checked_mul(factor)
            .map_or(self.max_wait, |wait| wait.min(self.max_wait))
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Builds the client used for one submission.
pub fn build_client(config: &SubmitterConfig) -> Result<reqwest::Client, SubmitError> {
    let tls = config.tls.as_ref();
    let mut builder = create_reqwest_client_builder(tls.and_then(|t| t.ca_cert_pem.as_deref()))
        .map_err(|e| SubmitError::Client(e.to_string()))?
        .connect_timeout(config.dial_timeout)
        .tcp_keepalive(Some(config.keep_alive))
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.max_idle_per_host);

    if let Some(tls) = tls {
        if let Some(pem) = &tls.client_identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| SubmitError::Client(format!("loading client identity: {e}")))?;
            builder = builder.identity(identity);
        }
        if tls.accept_invalid_certs {
            warn!("TLS certificate verification is disabled for the trap");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| SubmitError::Client(e.to_string()))
}

/// Successful exchange with the trap.
#[derive(Debug)]
pub struct Delivered {
    pub body: Vec<u8>,
    pub attempts: u32,
}

/// Sends `request` until it succeeds, fails terminally, runs out of attempts, or
/// `cancel` fires. Every attempt clones the same request, so the body and the
/// submission id never change between retries.
pub async fn send_with_retry(
    request: &reqwest::RequestBuilder,
    url: &str,
    policy: &RetryPolicy,
    monitor: &dyn SelfMonitor,
    cancel: &CancellationToken,
) -> Result<Delivered, SubmitError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        if attempt > 1 {
            monitor.increment_retries();
            warn!(url, retry = attempt - 1, "retrying...");
        }

        let Some(cloned) = request.try_clone() else {
            return Err(SubmitError::Client(
                "request body can't be cloned".to_string(),
            ));
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Submission to {url} cancelled during attempt {attempt}");
                return Err(SubmitError::Cancelled);
            }
            result = execute(cloned, url) => result,
        };
        monitor.record_latency(start.elapsed());

        let err = match result {
            Ok(body) => {
                return Ok(Delivered {
                    body,
                    attempts: attempt,
                })
            }
            Err(err) => err,
        };

        if let Some(status) = err.status_code() {
            monitor.increment_errors(status.as_u16());
            warn!(url, %status, "non-200 response...");
        }
        if !err.is_retryable() || attempt >= policy.max_attempts() {
            monitor.increment_failures(err.status_code().map(|s| s.as_u16()));
            if err.is_retryable() {
                warn!("Giving up on {url} after {attempt} attempts");
            }
            return Err(err);
        }

        let wait = policy.backoff(attempt);
        debug!("Attempt {attempt} to {url} failed: {err}, retrying in {wait:?}");
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SubmitError::Cancelled),
            () = tokio::time::sleep(wait) => {}
        }
    }
}

async fn execute(request: reqwest::RequestBuilder, url: &str) -> Result<Vec<u8>, SubmitError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if status != StatusCode::OK {
        return Err(SubmitError::Status {
            url: url.to_string(),
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body.to_vec())
}
