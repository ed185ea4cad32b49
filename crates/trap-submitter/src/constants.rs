// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Name reported in the `User-Agent` header.
pub const AGENT_NAME: &str = env!("CARGO_PKG_NAME");
/// Version reported in the `User-Agent` header.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Payloads at or below this many bytes are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// chrono format for trace dump filenames, UTC with nanoseconds.
pub const TRACE_TS_FORMAT: &str = "%Y%m%d_%H%M%S%.9f";

/// Header carrying the per-submission identifier, stable across retries.
pub const SUBMIT_ID_HEADER: &str = "X-Circonus-Submit-Id";

pub const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_millis(50);
pub const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRIES: u32 = 10;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// The trap is a single fixed endpoint, so a tiny idle pool is enough.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 2;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Initial capacity for encoded metric buffers before any size has been observed.
pub const DEFAULT_BUFFER_SIZE: usize = 32_768;
