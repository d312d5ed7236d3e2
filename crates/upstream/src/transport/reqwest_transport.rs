use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;

use super::{HttpTransport, TransportError};
use crate::models::{HttpMethod, RetryAfter, UpstreamRequest, UpstreamResponse};

const USER_AGENT: &str = concat!("coinpulse/", env!("CARGO_PKG_VERSION"));

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport whose client enforces `timeout` per request.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, timeout }
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout(self.timeout);
        }

        let message = error_chain(&error);
        if looks_like_dns_failure(&message) {
            TransportError::Dns(message)
        } else if error.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Other(message)
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Head => self.client.head(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(
            "Upstream request: {} {} ({})",
            request.method, request.resource_key, request.url
        );

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(RetryAfter::parse);

        let body = response.text().await.map_err(|e| self.map_error(e))?;

        Ok(UpstreamResponse {
            status,
            retry_after,
            body: Arc::from(body),
        })
    }
}

/// Flatten an error and its sources into one message.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn looks_like_dns_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_failure_detection() {
        assert!(looks_like_dns_failure(
            "error sending request: dns error: failed to lookup address information"
        ));
        assert!(!looks_like_dns_failure("connection refused"));
    }
}
