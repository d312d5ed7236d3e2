//! Per-fetch attempt tracking.

use std::time::Duration;

use crate::models::ResourceKey;

/// What happened on a single attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptResult {
    /// 2xx response.
    Success { status: u16 },

    /// 429; `cooldown` was written to the backoff store.
    Throttled { cooldown: Duration },

    /// 5xx response.
    ServerError { status: u16 },

    /// Edge status reporting the origin as unreachable.
    Unreachable { status: u16 },

    /// Non-retryable status.
    ClientError { status: u16 },

    /// No response at all.
    TransportFailure { message: String },

    /// A cooldown was active; no network call was made.
    BackoffActive { remaining: Duration },
}

/// Record of a single attempt during a fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub result: AttemptResult,
    pub elapsed: Duration,
}

/// Attempt-by-attempt account of one coordinated fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchDiagnostics {
    pub resource_key: ResourceKey,
    pub attempts: Vec<AttemptRecord>,
}

impl FetchDiagnostics {
    pub fn new(resource_key: ResourceKey) -> Self {
        Self {
            resource_key,
            attempts: Vec::new(),
        }
    }

    pub fn record(&mut self, attempt: u32, result: AttemptResult, elapsed: Duration) {
        self.attempts.push(AttemptRecord {
            attempt,
            result,
            elapsed,
        });
    }

    /// Attempts that actually reached the network.
    pub fn network_calls(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.result, AttemptResult::BackoffActive { .. }))
            .count()
    }

    /// Check if any attempt succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.result, AttemptResult::Success { .. }))
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return format!("{}: no attempts", self.resource_key);
        }

        let steps = self
            .attempts
            .iter()
            .map(|a| {
                let outcome = match &a.result {
                    AttemptResult::Success { status } => format!("OK {}", status),
                    AttemptResult::Throttled { cooldown } => {
                        format!("THROTTLED (cooldown {:?})", cooldown)
                    }
                    AttemptResult::ServerError { status } => format!("SERVER ERROR {}", status),
                    AttemptResult::Unreachable { status } => format!("UNREACHABLE {}", status),
                    AttemptResult::ClientError { status } => format!("CLIENT ERROR {}", status),
                    AttemptResult::TransportFailure { message } => {
                        format!("TRANSPORT ({})", message)
                    }
                    AttemptResult::BackoffActive { remaining } => {
                        format!("BACKOFF ({:?} left)", remaining)
                    }
                };
                format!("#{} {} in {:?}", a.attempt, outcome, a.elapsed)
            })
            .collect::<Vec<_>>()
            .join(" -> ");

        format!("{}: {}", self.resource_key, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics() -> FetchDiagnostics {
        FetchDiagnostics::new(ResourceKey::new("price:bitcoin").unwrap())
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = diagnostics();
        diag.record(1, AttemptResult::ServerError { status: 503 }, Duration::from_millis(20));
        diag.record(
            2,
            AttemptResult::TransportFailure {
                message: "timeout".to_string(),
            },
            Duration::from_millis(30),
        );
        diag.record(3, AttemptResult::Success { status: 200 }, Duration::from_millis(10));

        let summary = diag.summary();
        assert!(summary.starts_with("price:bitcoin: "));
        assert!(summary.contains("#1 SERVER ERROR 503"));
        assert!(summary.contains("#2 TRANSPORT (timeout)"));
        assert!(summary.contains("#3 OK 200"));
    }

    #[test]
    fn test_network_calls_excludes_backoff() {
        let mut diag = diagnostics();
        diag.record(
            1,
            AttemptResult::BackoffActive {
                remaining: Duration::from_secs(3),
            },
            Duration::ZERO,
        );
        assert_eq!(diag.network_calls(), 0);
        assert!(!diag.has_success());

        diag.record(2, AttemptResult::Success { status: 200 }, Duration::ZERO);
        assert_eq!(diag.network_calls(), 1);
        assert!(diag.has_success());
    }
}
