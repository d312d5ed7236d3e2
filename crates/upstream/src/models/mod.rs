//! Upstream fetch models
//!
//! This module contains the data types exchanged with the coordinator:
//! - `resource_key` - Normalized identifier of a logical resource (ResourceKey)
//! - `request` - Request descriptor (UpstreamRequest, HttpMethod)
//! - `response` - Raw transport response and fetch result (UpstreamResponse, FetchOutcome)

mod request;
mod resource_key;
mod response;

pub use request::{HttpMethod, UpstreamRequest};
pub use resource_key::{InvalidResourceKey, ResourceKey};
pub use response::{FetchOutcome, RetryAfter, UpstreamResponse};
