//! Error types and retry classification for upstream fetches.
//!
//! This module provides:
//! - [`FetchError`]: The typed failure returned by the fetch coordinator
//! - [`ErrorKind`] / [`ErrorEnvelope`]: The client-facing error taxonomy
//! - [`RetryClass`]: Classification of an attempt outcome for the retry loop

mod retry;

pub use retry::{classify_status, RetryClass};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Maximum number of body characters carried into an error message.
const BODY_SNIPPET_LEN: usize = 200;

/// Errors returned by [`FetchCoordinator::fetch`](crate::FetchCoordinator::fetch).
///
/// The type is `Clone` because a single failure is handed to every caller
/// that was coalesced onto the same in-flight operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// A cooldown recorded after a throttling response is still active.
    /// No network call was made.
    #[error("Backoff in effect for {resource_key} until {until}")]
    BackoffInEffect {
        resource_key: String,
        until: DateTime<Utc>,
        remaining: Duration,
    },

    /// The upstream could not be reached: DNS, connect, timeout, or an
    /// edge status reporting the origin as unreachable.
    #[error("Network or DNS failure for {resource_key} after {attempts} attempt(s): {message}")]
    NetworkOrDnsFailure {
        resource_key: String,
        attempts: u32,
        message: String,
    },

    /// The upstream answered with a non-retryable status.
    #[error("Upstream returned HTTP {status} for {resource_key}: {message}")]
    UpstreamHttpError {
        resource_key: String,
        status: u16,
        message: String,
    },

    /// Every allowed attempt was used without a successful response.
    #[error("Retries exhausted for {resource_key} after {attempts} attempt(s)")]
    RetriesExhausted {
        resource_key: String,
        attempts: u32,
        last_status: Option<u16>,
        retry_after: Option<Duration>,
    },
}

impl FetchError {
    /// Returns the taxonomy member for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackoffInEffect { .. } => ErrorKind::BackoffInEffect,
            Self::NetworkOrDnsFailure { .. } => ErrorKind::NetworkOrDnsFailure,
            Self::UpstreamHttpError { .. } => ErrorKind::UpstreamHttpError,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// The resource key the failed fetch was for.
    pub fn resource_key(&self) -> &str {
        match self {
            Self::BackoffInEffect { resource_key, .. }
            | Self::NetworkOrDnsFailure { resource_key, .. }
            | Self::UpstreamHttpError { resource_key, .. }
            | Self::RetriesExhausted { resource_key, .. } => resource_key,
        }
    }

    /// How long a client should wait before trying again, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::BackoffInEffect { remaining, .. } => Some(*remaining),
            Self::RetriesExhausted { retry_after, .. } => *retry_after,
            Self::NetworkOrDnsFailure { .. } | Self::UpstreamHttpError { .. } => None,
        }
    }

    /// Builds the client-facing envelope for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        let detail = match self {
            Self::BackoffInEffect { until, .. } => Some(format!("cooldown until {}", until.to_rfc3339())),
            Self::NetworkOrDnsFailure { attempts, .. } => Some(format!("{} attempt(s)", attempts)),
            Self::UpstreamHttpError { status, .. } => Some(format!("upstream status {}", status)),
            Self::RetriesExhausted {
                attempts,
                last_status,
                ..
            } => Some(match last_status {
                Some(status) => format!("{} attempt(s), last status {}", attempts, status),
                None => format!("{} attempt(s)", attempts),
            }),
        };

        ErrorEnvelope {
            kind: self.kind(),
            message: self.to_string(),
            detail,
            retry_after_seconds: self.retry_after().map(ceil_secs),
        }
    }
}

/// The client-visible error taxonomy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    BackoffInEffect,
    NetworkOrDnsFailure,
    UpstreamHttpError,
    RetriesExhausted,
    /// Raised by resource handlers when a 2xx body fails validation.
    InvalidUpstreamPayload,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BackoffInEffect => "BackoffInEffect",
            Self::NetworkOrDnsFailure => "NetworkOrDnsFailure",
            Self::UpstreamHttpError => "UpstreamHttpError",
            Self::RetriesExhausted => "RetriesExhausted",
            Self::InvalidUpstreamPayload => "InvalidUpstreamPayload",
        };
        f.write_str(name)
    }
}

/// Structured error body returned to clients once every fallback is exhausted.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Rounds a duration up to whole seconds, as required by `Retry-After`.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Truncates an upstream body for inclusion in diagnostics.
pub(crate) fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_LEN {
        trimmed.to_string()
    } else {
        let snippet: String = trimmed.chars().take(BODY_SNIPPET_LEN).collect();
        format!("{}...", snippet)
    }
}
