// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use trap_submitter::config::{SubmitterConfig, TlsConfig};

const DEFAULT_INTERNAL_FLUSH_INTERVAL: u64 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read CA bundle {}: {source}", path.display())]
    CaBundle {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration for the forwarder binary
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Engine configuration built from `TRAP_*` variables
    pub submitter: SubmitterConfig,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// How often the engine's own metrics are submitted; `None` disables it
    pub internal_flush_interval: Option<Duration>,
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ForwarderError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ForwarderError> {
        let flag = |name: &str, default: bool| {
            lookup(name)
                .map(|val| parse_bool(&val).unwrap_or(default))
                .unwrap_or(default)
        };

        let defaults = SubmitterConfig::default();
        let dry_run = flag("TRAP_DRY_RUN", false);
        let submission_url = if dry_run {
            None
        } else {
            lookup("TRAP_SUBMISSION_URL").filter(|url| !url.trim().is_empty())
        };

        let tls = match lookup("TRAP_CA_CERT_PATH").filter(|p| !p.is_empty()) {
            Some(path) => {
                let path = PathBuf::from(path);
                let pem = std::fs::read(&path)
                    .map_err(|source| ForwarderError::CaBundle { path, source })?;
                Some(TlsConfig {
                    ca_cert_pem: Some(pem),
                    ..Default::default()
                })
            }
            None => None,
        };

        let interval = match lookup("TRAP_INTERNAL_FLUSH_INTERVAL") {
            Some(val) => val.trim().parse::<u64>().map_err(|_| {
                ForwarderError::InvalidConfig(format!(
                    "TRAP_INTERNAL_FLUSH_INTERVAL must be a number of seconds, got '{val}'"
                ))
            })?,
            None => DEFAULT_INTERNAL_FLUSH_INTERVAL,
        };

        let submitter = SubmitterConfig {
            submission_url,
            check_uuid: lookup("TRAP_CHECK_UUID").unwrap_or_default(),
            tls,
            use_compression: flag("TRAP_USE_COMPRESSION", defaults.use_compression),
            trace_submits: lookup("TRAP_TRACE_SUBMITS")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            concurrent_submissions: flag(
                "TRAP_CONCURRENT_SUBMISSIONS",
                defaults.concurrent_submissions,
            ),
            debug_submissions: flag("TRAP_DEBUG_SUBMISSIONS", false),
            ..defaults
        };

        let config = Self {
            submitter,
            log_level: lookup("TRAP_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            internal_flush_interval: (interval > 0).then(|| Duration::from_secs(interval)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForwarderError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ForwarderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        self.submitter
            .validate()
            .map_err(|e| ForwarderError::InvalidConfig(e.to_string()))
    }

    /// `EnvFilter` directives for `level`, silencing the HTTP and TLS stacks.
    #[must_use]
    pub fn log_filter(level: &str) -> String {
        format!("h2=off,hyper=off,rustls=off,{level}")
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.submitter.is_dry_run()
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
