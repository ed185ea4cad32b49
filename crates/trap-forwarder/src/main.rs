// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use std::{env, path::PathBuf, sync::Arc, time::Duration};
use tokio::io::AsyncReadExt;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use trap_submitter::{
    engine::{Engine, Outcome, Submitter},
    monitor::InternalMetrics,
};

use crate::config::{ForwarderConfig, DEFAULT_LOG_LEVEL};

/// Where a payload is read from.
#[derive(Debug)]
enum Input {
    File(PathBuf),
    Stdin,
}

impl Input {
    fn from_args() -> Vec<Input> {
        let files: Vec<Input> = env::args().skip(1).map(|a| Input::File(a.into())).collect();
        if files.is_empty() {
            vec![Input::Stdin]
        } else {
            files
        }
    }

    fn name(&self) -> String {
        match self {
            Input::File(path) => path.display().to_string(),
            Input::Stdin => "<stdin>".to_string(),
        }
    }

    async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Input::File(path) => tokio::fs::read(path).await,
            Input::Stdin => {
                let mut data = Vec::new();
                tokio::io::stdin().read_to_end(&mut data).await?;
                Ok(data)
            }
        }
    }
}

fn init_logging(env_filter: &str) {
    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}

#[tokio::main]
pub async fn main() {
    let config = match ForwarderConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            init_logging(&ForwarderConfig::log_filter(DEFAULT_LOG_LEVEL));
            error!("Error creating config on trap forwarder startup: {e}");
            return;
        }
    };
    init_logging(&ForwarderConfig::log_filter(&config.log_level));

    if config.is_dry_run() {
        info!("No submission URL configured, writing payloads to stdout");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            signal_token.cancel();
        }
    });

    let monitor = Arc::new(InternalMetrics::new());
    let submitter = Submitter::new(Arc::new(config.submitter.clone()), monitor.clone());
    // shares the engine's counters, outlives it for the final report
    let stats_handle = submitter.clone();

    let (engine, worker) = match Engine::new(submitter, shutdown.child_token()) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Error creating submission engine: {e}");
            return;
        }
    };
    let engine = Arc::new(engine);
    let worker_handle = worker.map(|worker| tokio::spawn(worker.run()));

    // internal metrics would be interleaved with the dry-run output
    let flush_period = config
        .internal_flush_interval
        .filter(|_| !config.is_dry_run());
    let stop_flush = shutdown.child_token();
    let flush_handle = flush_period.map(|period| {
        tokio::spawn(flush_internal_periodically(
            Arc::clone(&engine),
            Arc::clone(&monitor),
            period,
            stop_flush.clone(),
        ))
    });

    for input in Input::from_args() {
        if shutdown.is_cancelled() {
            break;
        }
        forward(&engine, &input, &shutdown).await;
    }

    stop_flush.cancel();
    if let Some(handle) = flush_handle {
        if let Err(e) = handle.await {
            error!("Internal metrics flush task failed: {e}");
        }
    }
    if flush_period.is_some() && !shutdown.is_cancelled() {
        flush_internal(&engine, &monitor, &shutdown).await;
    }

    // dropping the last queue handle lets the worker drain and exit
    drop(engine);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!("Submission worker failed: {e}");
        }
    }

    let stats = stats_handle.stats().snapshot();
    info!(
        "Forwarder done: {} metrics accepted, {} sent",
        stats.metrics, stats.sent_size
    );
}

async fn forward(engine: &Engine, input: &Input, cancel: &CancellationToken) {
    let name = input.name();
    let data = match input.read().await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to read {name}: {e}");
            return;
        }
    };
    if data.is_empty() {
        warn!("Skipping empty input {name}");
        return;
    }

    let span = info_span!("forward", input = %name);
    match engine.submit_stream(data, span, cancel).await {
        Ok(Outcome::Delivered(result)) => info!(
            "{name}: trap accepted {} metrics, filtered {}",
            result.stats, result.filtered
        ),
        Ok(Outcome::Queued) => debug!("{name}: queued for submission"),
        Ok(Outcome::DryRun { bytes }) => debug!("{name}: wrote {bytes} bytes"),
        Err(e) => error!("{name}: submission failed: {e}"),
    }
}

async fn flush_internal_periodically(
    engine: Arc<Engine>,
    monitor: Arc<InternalMetrics>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut flush_interval = interval(period);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = flush_interval.tick() => flush_internal(&engine, &monitor, &cancel).await,
        }
    }
}

async fn flush_internal(engine: &Engine, monitor: &InternalMetrics, cancel: &CancellationToken) {
    match engine.flush_internal_metrics(monitor, cancel).await {
        Ok(Some(_)) => debug!("Flushed internal metrics"),
        Ok(None) => {}
        Err(e) => error!("Failed to flush internal metrics: {e}"),
    }
}
