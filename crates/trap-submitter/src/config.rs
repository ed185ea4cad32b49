// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    COMPRESSION_THRESHOLD, DEFAULT_DIAL_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_MAX_IDLE_PER_HOST,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT,
};
use crate::errors::SubmitError;
use crate::transport::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// TLS material for the trap, usually a broker with a private CA.
#[derive(Clone, Default)]
pub struct TlsConfig {
    /// PEM bundle of CA certificates trusted in addition to the platform roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    /// PEM containing a client certificate chain followed by its private key.
    pub client_identity_pem: Option<Vec<u8>>,
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_pem", &self.ca_cert_pem.as_ref().map(Vec::len))
            .field("client_identity", &self.client_identity_pem.is_some())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Configuration for a submission engine. Fixed for the engine's lifetime.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Trap URL. `None` or empty means dry-run: payloads go to the local sink.
    pub submission_url: Option<String>,
    /// Identifier of the check this engine submits for, echoed in every `TrapResult`.
    pub check_uuid: String,
    pub tls: Option<TlsConfig>,
    pub use_compression: bool,
    /// Payloads larger than this many bytes are gzipped when compression is on.
    pub compression_threshold: usize,
    /// Directory receiving a copy of every transmitted payload.
    pub trace_submits: Option<PathBuf>,
    /// `true` submits on the caller's task, `false` funnels through the queue.
    pub concurrent_submissions: bool,
    /// Print every outbound request before sending it.
    pub debug_submissions: bool,
    pub retry: RetryPolicy,
    pub queue_capacity: usize,
    pub dial_timeout: Duration,
    pub keep_alive: Duration,
    pub request_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            submission_url: None,
            check_uuid: String::new(),
            tls: None,
            use_compression: true,
            compression_threshold: COMPRESSION_THRESHOLD,
            trace_submits: None,
            concurrent_submissions: false,
            debug_submissions: false,
            retry: RetryPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }
}

impl SubmitterConfig {
    /// The trap URL, or `None` when running dry.
    #[must_use]
    pub fn submission_url(&self) -> Option<&str> {
        self.submission_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.submission_url().is_none()
    }

    pub fn validate(&self) -> Result<(), SubmitError> {
        if let Some(url) = self.submission_url() {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| SubmitError::InvalidConfig(format!("submission url {url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SubmitError::InvalidConfig(format!(
                    "submission url {url}: unsupported scheme {}",
                    parsed.scheme()
                )));
            }
        }
        if !self.concurrent_submissions && self.queue_capacity == 0 {
            return Err(SubmitError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.min_wait > self.retry.max_wait {
            return Err(SubmitError::InvalidConfig(
                "retry min wait exceeds max wait".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_dry_run_serialized() {
        let config = SubmitterConfig::default();
        assert!(config.is_dry_run());
        assert!(!config.concurrent_submissions);
        assert!(config.use_compression);
        assert_eq!(config.compression_threshold, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_url_means_dry_run() {
        let config = SubmitterConfig {
            submission_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.is_dry_run());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = SubmitterConfig {
            submission_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SubmitError::InvalidConfig(_))));

        let config = SubmitterConfig {
            submission_url: Some("ftp://trap.example.com/".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SubmitError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_queue_when_serialized() {
        let config = SubmitterConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SubmitterConfig {
            queue_capacity: 0,
            concurrent_submissions: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
