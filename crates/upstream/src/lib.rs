//! CoinPulse Upstream Crate
//!
//! Coordinated access to rate-limited third-party HTTP APIs.
//!
//! # Overview
//!
//! Every upstream call goes through a [`FetchCoordinator`], which:
//! - Coalesces concurrent identical requests onto one network operation
//! - Persists a cooldown per resource when the provider throttles (HTTP 429)
//! - Retries server errors and transport failures with bounded, jittered backoff
//! - Maps every failure onto a small, client-facing error taxonomy
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  UpstreamRequest |  (resource key + URL)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! | FetchCoordinator | <-> |   BackoffStore   |  (cooldown per resource key)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |  HttpTransport   |  (reqwest in production, scripted in tests)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |   FetchOutcome   |  (status, raw body, attempt diagnostics)
//! +------------------+
//! ```
//!
//! The coordinator knows nothing about response schemas or caching; callers
//! decode [`FetchOutcome::body`] themselves.

pub mod backoff;
pub mod clock;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backoff::{BackoffStore, BackoffStoreError, InMemoryBackoffStore};
pub use clock::{Clock, SystemClock, TokioClock};
pub use coordinator::{
    AttemptRecord, AttemptResult, FetchCoordinator, FetchDiagnostics, FetchResult, RetryPolicy,
    MAX_ATTEMPTS_LIMIT,
};
pub use errors::{ceil_secs, classify_status, ErrorEnvelope, ErrorKind, FetchError, RetryClass};
pub use models::{
    FetchOutcome, HttpMethod, InvalidResourceKey, ResourceKey, RetryAfter, UpstreamRequest,
    UpstreamResponse,
};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
