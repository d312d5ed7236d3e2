//! HTTP transport abstraction.
//!
//! The coordinator is schema-agnostic and only needs "send a request, get back
//! status, headers and body". [`HttpTransport`] is that seam; [`ReqwestTransport`]
//! is the production implementation.

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{UpstreamRequest, UpstreamResponse};

/// Failure to obtain any HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Sends a single request attempt.
///
/// Implementations must not retry; retry policy belongs to the coordinator.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}
