// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the submission engine.

use reqwest::StatusCode;

/// Failure of a single logical submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Caller contract violation, no network attempt was made.
    #[error("invalid metrics ({0})")]
    InvalidInput(&'static str),

    #[error("marshaling metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("compressing metrics: {0}")]
    Encoding(#[from] std::io::Error),

    #[error("writing dry-run output: {0}")]
    DryRun(std::io::Error),

    #[error("creating http client: {0}")]
    Client(String),

    #[error("making request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("submitting metrics ({url} {status})")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("parsing response ({body}): {source}")]
    ResponseParse {
        source: serde_json::Error,
        body: String,
    },

    #[error("submission cancelled")]
    Cancelled,

    #[error("submission queue is full")]
    QueueFull,

    #[error("submission queue is closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SubmitError {
    /// Whether another transport attempt could succeed: connection-level errors,
    /// timeouts, 5xx and 429 are retried; everything else is terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Status code attached to the failure, if the trap answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
