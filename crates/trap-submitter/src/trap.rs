// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request building and response parsing for the trap protocol.

use crate::constants::{AGENT_NAME, AGENT_VERSION, SUBMIT_ID_HEADER};
use crate::encoder::Payload;
use crate::errors::SubmitError;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
    USER_AGENT,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use uuid::Uuid;

/// Summary returned by the trap for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapResult {
    /// Set locally from the engine configuration, never by the trap.
    #[serde(skip)]
    pub check_uuid: String,
    /// Set locally, shared by every attempt of the submission.
    #[serde(skip, default = "Uuid::nil")]
    pub submit_uuid: Uuid,
    /// Samples accepted by the trap.
    pub stats: u64,
    #[serde(default)]
    pub filtered: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Headers for one submission. Identical for every retry.
#[must_use]
pub fn request_headers(payload: &Payload, submit_uuid: &Uuid) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(agent) = HeaderValue::from_str(&format!("{AGENT_NAME}/{AGENT_VERSION}")) {
        headers.insert(USER_AGENT, agent);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));
    if payload.compressed {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    if let Ok(id) = HeaderValue::from_str(&submit_uuid.to_string()) {
        headers.insert(SUBMIT_ID_HEADER, id);
    }
    headers
}

/// PUT request for `payload`. The builder owns a copy of the body so it can be
/// cloned for each retry without re-encoding.
pub fn build_request(
    client: &reqwest::Client,
    url: &str,
    payload: &Payload,
    submit_uuid: &Uuid,
) -> reqwest::RequestBuilder {
    client
        .put(url)
        .headers(request_headers(payload, submit_uuid))
        .body(payload.body.clone())
}

/// Human-readable rendering of the outbound request. Compressed bodies are
/// summarized rather than printed.
#[must_use]
pub fn render_request(url: &str, payload: &Payload, submit_uuid: &Uuid) -> String {
    let mut dump = format!("PUT {url} HTTP/1.1\r\n");
    for (name, value) in &request_headers(payload, submit_uuid) {
        let _ = write!(
            dump,
            "{}: {}\r\n",
            name,
            value.to_str().unwrap_or("<binary>")
        );
    }
    dump.push_str("\r\n");
    if payload.compressed {
        let _ = write!(dump, "<{} bytes gzip>", payload.len());
    } else {
        dump.push_str(&String::from_utf8_lossy(&payload.body));
    }
    dump
}

/// Parses a trap response body, keeping the raw body in the error for diagnosis.
pub fn parse_response(
    check_uuid: &str,
    submit_uuid: Uuid,
    body: &[u8],
) -> Result<TrapResult, SubmitError> {
    let mut result: TrapResult =
        serde_json::from_slice(body).map_err(|source| SubmitError::ResponseParse {
            source,
            body: String::from_utf8_lossy(body).into_owned(),
        })?;
    result.check_uuid = check_uuid.to_string();
    result.submit_uuid = submit_uuid;
    Ok(result)
}
