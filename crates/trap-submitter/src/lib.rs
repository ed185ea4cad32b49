// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric submission engine.
//!
//! Delivers encoded metric payloads to a single trap endpoint over HTTP PUT, either
//! directly from the calling task (concurrent mode) or through a single-consumer
//! queue (serialized mode). Payloads over the compression threshold are gzipped,
//! every transport attempt is retried with exponential backoff and reported to a
//! [`monitor::SelfMonitor`], and confirmed deliveries feed the [`stats::Stats`]
//! counters.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod encoder;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod metric;
pub mod monitor;
pub mod queue;
pub mod stats;
pub mod transport;
pub mod trap;
pub mod util;
