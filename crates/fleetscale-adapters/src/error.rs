//! Adapter failures, folded into the port error kinds at the boundary.

use std::time::Duration;

use fleetscale_autoscale::{FleetError, TelemetryError};
use fleetscale_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{method} {url} timed out after {after:?}")]
    Timeout {
        method: http::Method,
        url: String,
        after: Duration,
    },

    #[error("{method} {url}: {source}")]
    Http {
        method: http::Method,
        url: String,
        #[source]
        source: hyper::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: http::Method,
        url: String,
        status: http::StatusCode,
        body: String,
    },

    #[error("decoding response of {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encoding request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

impl From<AdapterError> for TelemetryError {
    fn from(err: AdapterError) -> Self {
        TelemetryError(chain(&err))
    }
}

impl From<AdapterError> for FleetError {
    fn from(err: AdapterError) -> Self {
        FleetError(chain(&err))
    }
}

fn chain(err: &AdapterError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
