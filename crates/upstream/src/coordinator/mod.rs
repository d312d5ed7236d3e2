//! Upstream fetch coordinator.
//!
//! Mediates every call to a rate-limited upstream:
//! - Coalesces concurrent identical requests onto one in-flight operation
//! - Fails fast while a persisted cooldown is active for the resource
//! - Retries with a status-aware policy (see [`RetryClass`])
//!
//! The coordinator is a pure fetch primitive: it never reads or writes the
//! response cache and does not look inside bodies.

mod diagnostics;
mod inflight;
mod policy;

pub use diagnostics::{AttemptRecord, AttemptResult, FetchDiagnostics};
pub use inflight::{FetchResult, InflightRegistry};
use inflight::SettleGuard;
pub use policy::{RetryPolicy, MAX_ATTEMPTS_LIMIT};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::backoff::BackoffStore;
use crate::clock::{Clock, SystemClock};
use crate::errors::{body_snippet, classify_status, FetchError, RetryClass};
use crate::models::{FetchOutcome, ResourceKey, UpstreamRequest};
use crate::transport::{HttpTransport, TransportError};
use inflight::Role;

/// Bound on a single backoff store call. A slow store counts as unavailable.
const BACKOFF_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Coordinates upstream fetches for one process instance.
pub struct FetchCoordinator {
    transport: Arc<dyn HttpTransport>,
    backoff: Arc<dyn BackoffStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    inflight: Arc<InflightRegistry>,
}

impl FetchCoordinator {
    /// Create a coordinator with the default retry policy and the system clock.
    pub fn new(transport: Arc<dyn HttpTransport>, backoff: Arc<dyn BackoffStore>) -> Self {
        Self {
            transport,
            backoff,
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::default(),
            inflight: Arc::new(InflightRegistry::new()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy.normalized();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Number of fetches currently in flight on this instance.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Fetch `request`, coalescing with any identical in-flight fetch.
    ///
    /// All callers coalesced onto one operation receive clones of the same
    /// result or error. The operation runs on a spawned task and settles even
    /// if every caller is cancelled. Resolves within [`RetryPolicy::worst_case_latency`]
    /// plus backoff store time.
    pub async fn fetch(&self, request: UpstreamRequest) -> FetchResult {
        let signature = request.signature();
        let resource_key = request.resource_key.clone();

        let (shared, role) = self.inflight.join_or_start(&signature, |generation| {
            let attempts = AttemptLoop {
                transport: Arc::clone(&self.transport),
                backoff: Arc::clone(&self.backoff),
                clock: Arc::clone(&self.clock),
                policy: self.policy.clone(),
            };
            let settle = SettleGuard::new(Arc::clone(&self.inflight), signature.clone(), generation);
            let task_key = resource_key.clone();

            // The loop runs on its own task so it neither stalls nor leaks its
            // registry entry when every caller goes away.
            let task = tokio::spawn(async move {
                let _settle = settle;
                attempts.run(request).await
            });

            async move {
                task.await.unwrap_or_else(|e| {
                    error!("Fetch task for '{}' did not complete: {}", task_key, e);
                    Err(FetchError::RetriesExhausted {
                        resource_key: task_key.to_string(),
                        attempts: 0,
                        last_status: None,
                        retry_after: None,
                    })
                })
            }
            .boxed()
        });

        if role == Role::Follower {
            debug!("Coalescing fetch for '{}' onto in-flight request", resource_key);
        }

        let mut result = shared.await;
        if role == Role::Follower {
            if let Ok(outcome) = result.as_mut() {
                outcome.coalesced = true;
            }
        }
        result
    }

    /// Remaining cooldown for `key`, if one is active. Fails open.
    pub async fn cooldown_remaining(&self, key: &ResourceKey) -> Option<Duration> {
        read_cooldown(self.backoff.as_ref(), self.clock.as_ref(), key)
            .await
            .map(|(_, remaining)| remaining)
    }
}

/// How the most recent retryable attempt failed.
enum Failure {
    Status(u16),
    Transport(TransportError),
}

/// One leader's run of the attempt loop.
struct AttemptLoop {
    transport: Arc<dyn HttpTransport>,
    backoff: Arc<dyn BackoffStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl AttemptLoop {
    async fn run(self, request: UpstreamRequest) -> FetchResult {
        let key = request.resource_key.clone();
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let mut diagnostics = FetchDiagnostics::new(key.clone());
        let mut last_failure: Option<Failure> = None;
        // Cooldown this loop wrote and already waited out.
        let mut own_cooldown: Option<DateTime<Utc>> = None;

        for attempt in 1..=max_attempts {
            if let Some((until, remaining)) =
                read_cooldown(self.backoff.as_ref(), self.clock.as_ref(), &key).await
            {
                if own_cooldown != Some(until) {
                    diagnostics.record(attempt, AttemptResult::BackoffActive { remaining }, Duration::ZERO);
                    info!(
                        "Backoff in effect for '{}' ({:?} remaining), skipping upstream call",
                        key, remaining
                    );
                    return Err(FetchError::BackoffInEffect {
                        resource_key: key.to_string(),
                        until,
                        remaining,
                    });
                }
            }

            let attempt_started = Instant::now();
            let sent = tokio::time::timeout(self.policy.attempt_timeout, self.transport.send(&request))
                .await
                .unwrap_or(Err(TransportError::Timeout(self.policy.attempt_timeout)));
            let elapsed = attempt_started.elapsed();
            let has_next = attempt < max_attempts;

            let response = match sent {
                Ok(response) => response,
                Err(error) => {
                    debug!(
                        "Attempt {}/{} for '{}' failed: {}",
                        attempt, max_attempts, key, error
                    );
                    diagnostics.record(
                        attempt,
                        AttemptResult::TransportFailure {
                            message: error.to_string(),
                        },
                        elapsed,
                    );
                    last_failure = Some(Failure::Transport(error));
                    if has_next {
                        tokio::time::sleep(self.policy.server_error_delay(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status;
            match classify_status(status) {
                None => {
                    diagnostics.record(attempt, AttemptResult::Success { status }, elapsed);
                    let latency = started.elapsed();
                    debug!(
                        "Fetched '{}' in {} attempt(s), {:?}",
                        key, attempt, latency
                    );
                    return Ok(FetchOutcome {
                        resource_key: key,
                        status,
                        body: response.body,
                        attempts: attempt,
                        latency,
                        coalesced: false,
                        diagnostics,
                    });
                }
                Some(RetryClass::Never) => {
                    diagnostics.record(attempt, AttemptResult::ClientError { status }, elapsed);
                    warn!("Upstream rejected '{}' with HTTP {}", key, status);
                    return Err(FetchError::UpstreamHttpError {
                        resource_key: key.to_string(),
                        status,
                        message: body_snippet(&response.body),
                    });
                }
                Some(RetryClass::Unreachable) => {
                    diagnostics.record(attempt, AttemptResult::Unreachable { status }, elapsed);
                    warn!(
                        "Upstream for '{}' reported origin unreachable (HTTP {})",
                        key, status
                    );
                    return Err(FetchError::NetworkOrDnsFailure {
                        resource_key: key.to_string(),
                        attempts: attempt,
                        message: format!("origin unreachable (HTTP {})", status),
                    });
                }
                Some(RetryClass::Throttled) => {
                    let now = self.clock.now();
                    let hint = response.retry_after.map(|r| r.delay_from(now));
                    let cooldown = self.policy.cooldown(attempt, hint);
                    let until = now + to_chrono(cooldown);

                    diagnostics.record(attempt, AttemptResult::Throttled { cooldown }, elapsed);
                    info!(
                        "Upstream throttled '{}', cooling down for {:?} (provider hint: {})",
                        key,
                        cooldown,
                        hint.is_some()
                    );
                    persist_cooldown(self.backoff.as_ref(), &key, until).await;

                    if has_next && cooldown <= self.policy.max_throttle_wait {
                        own_cooldown = Some(until);
                        tokio::time::sleep(cooldown).await;
                        continue;
                    }

                    warn!("Fetch for '{}' gave up: {}", key, diagnostics.summary());
                    return Err(FetchError::RetriesExhausted {
                        resource_key: key.to_string(),
                        attempts: attempt,
                        last_status: Some(status),
                        retry_after: Some(cooldown),
                    });
                }
                Some(RetryClass::Transient) => {
                    diagnostics.record(attempt, AttemptResult::ServerError { status }, elapsed);
                    debug!(
                        "Attempt {}/{} for '{}' got HTTP {}",
                        attempt, max_attempts, key, status
                    );
                    last_failure = Some(Failure::Status(status));
                    if has_next {
                        tokio::time::sleep(self.policy.server_error_delay(attempt)).await;
                    }
                }
            }
        }

        warn!("Fetch for '{}' gave up: {}", key, diagnostics.summary());

        Err(match last_failure {
            Some(Failure::Transport(error)) => FetchError::NetworkOrDnsFailure {
                resource_key: key.to_string(),
                attempts: max_attempts,
                message: error.to_string(),
            },
            Some(Failure::Status(status)) => FetchError::RetriesExhausted {
                resource_key: key.to_string(),
                attempts: max_attempts,
                last_status: Some(status),
                retry_after: None,
            },
            None => FetchError::RetriesExhausted {
                resource_key: key.to_string(),
                attempts: max_attempts,
                last_status: None,
                retry_after: None,
            },
        })
    }
}

/// Active cooldown for `key` as `(until, remaining)`.
///
/// Store errors and timeouts are logged and read as "no backoff".
async fn read_cooldown(
    store: &dyn BackoffStore,
    clock: &dyn Clock,
    key: &ResourceKey,
) -> Option<(DateTime<Utc>, Duration)> {
    let until = match tokio::time::timeout(BACKOFF_STORE_TIMEOUT, store.get(key)).await {
        Ok(Ok(Some(until))) => until,
        Ok(Ok(None)) => return None,
        Ok(Err(e)) => {
            warn!("Backoff store read failed for '{}', failing open: {}", key, e);
            return None;
        }
        Err(_) => {
            warn!("Backoff store read timed out for '{}', failing open", key);
            return None;
        }
    };

    let now = clock.now();
    if until > now {
        Some((until, (until - now).to_std().unwrap_or(Duration::ZERO)))
    } else {
        None
    }
}

async fn persist_cooldown(store: &dyn BackoffStore, key: &ResourceKey, until: DateTime<Utc>) {
    match tokio::time::timeout(BACKOFF_STORE_TIMEOUT, store.set(key, until)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to persist cooldown for '{}': {}", key, e),
        Err(_) => warn!("Persisting cooldown for '{}' timed out", key),
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
