use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::ResourceKey;
use crate::coordinator::FetchDiagnostics;

/// Provider-supplied retry hint from a `Retry-After` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryAfter {
    /// `Retry-After: <delta-seconds>`
    Delay(Duration),
    /// `Retry-After: <HTTP-date>`
    At(DateTime<Utc>),
}

impl RetryAfter {
    /// Parse a `Retry-After` header value.
    ///
    /// Accepts delta-seconds (integer or fractional) and RFC 2822 / IMF-fixdate
    /// dates. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Self::Delay(Duration::from_secs(seconds)));
        }

        if let Ok(seconds) = value.parse::<f64>() {
            if seconds.is_finite() && seconds >= 0.0 {
                // Out-of-range hints saturate; the retry policy caps them.
                let delay = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
                return Some(Self::Delay(delay));
            }
            return None;
        }

        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|date| Self::At(date.with_timezone(&Utc)))
    }

    /// Delay relative to `now`. Dates in the past resolve to zero.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Delay(delay) => *delay,
            Self::At(at) => (*at - now).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

/// Raw response returned by an [`HttpTransport`](crate::HttpTransport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub retry_after: Option<RetryAfter>,
    pub body: Arc<str>,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<Arc<str>>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: RetryAfter) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Successful result of a coordinated fetch.
///
/// Cloned for every caller coalesced onto the same operation; `coalesced`
/// is set on the clones handed to callers that did not start it.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub resource_key: ResourceKey,
    pub status: u16,
    pub body: Arc<str>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Wall time from the first attempt to completion.
    pub latency: Duration,
    pub coalesced: bool,
    pub diagnostics: FetchDiagnostics,
}

impl FetchOutcome {
    /// Deserialize the body. Schema checks belong to the caller.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}
