// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for integration tests

pub mod mock_server;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trap_submitter::config::SubmitterConfig;
use trap_submitter::engine::{Engine, SharedBuffer, Submitter};
use trap_submitter::monitor::InternalMetrics;
use trap_submitter::queue::SubmissionWorker;
use trap_submitter::transport::RetryPolicy;

/// Fast retries so failing scenarios finish quickly.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        min_wait: Duration::from_millis(1),
        max_wait: Duration::from_millis(5),
        max_retries,
    }
}

pub fn config_for(url: &str) -> SubmitterConfig {
    SubmitterConfig {
        submission_url: Some(url.to_string()),
        check_uuid: "test-check".to_string(),
        concurrent_submissions: true,
        retry: fast_retry(3),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub struct TestEngine {
    pub engine: Engine,
    pub worker: Option<SubmissionWorker>,
    pub monitor: Arc<InternalMetrics>,
    pub sink: SharedBuffer,
    pub worker_cancel: CancellationToken,
}

pub fn test_engine(config: SubmitterConfig) -> TestEngine {
    let monitor = Arc::new(InternalMetrics::new());
    let sink = SharedBuffer::default();
    let submitter = Submitter::new(Arc::new(config), monitor.clone()).with_sink(sink.clone());
    let worker_cancel = CancellationToken::new();
    let (engine, worker) =
        Engine::new(submitter, worker_cancel.clone()).expect("failed to create engine");
    TestEngine {
        engine,
        worker,
        monitor,
        sink,
        worker_cancel,
    }
}
