//! Retry policy for the coordinator's attempt loop.
//!
//! Two independent exponential schedules are kept: one for throttling (429),
//! whose delay also becomes the persisted cooldown, and a shorter one for
//! server errors and transport failures, which never touches the backoff store.

use std::time::Duration;

use rand::Rng;

/// Upper bound on attempts per fetch, whatever the configuration says.
pub const MAX_ATTEMPTS_LIMIT: u32 = 5;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_THROTTLE_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_THROTTLE_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_THROTTLE_WAIT: Duration = Duration::from_secs(4);
const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(3600);
const DEFAULT_SERVER_ERROR_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_SERVER_ERROR_MAX_DELAY: Duration = Duration::from_secs(2);

/// Retry/backoff configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per fetch, clamped to `1..=MAX_ATTEMPTS_LIMIT`.
    pub max_attempts: u32,
    /// Bound on a single network attempt. A timeout counts as a transport failure.
    pub attempt_timeout: Duration,
    /// First computed throttle delay when the provider sends no `Retry-After`.
    pub throttle_base_delay: Duration,
    /// Cap on computed throttle delays.
    pub throttle_max_delay: Duration,
    /// Longest throttle delay the loop will sleep through before retrying.
    /// Longer cooldowns end the call; the persisted record gates later calls.
    pub max_throttle_wait: Duration,
    /// Cap on any persisted cooldown, provider-supplied ones included.
    pub max_cooldown: Duration,
    /// First delay after a server error or transport failure.
    pub server_error_base_delay: Duration,
    /// Cap on server-error delays.
    pub server_error_max_delay: Duration,
    /// Randomize computed delays within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            throttle_base_delay: DEFAULT_THROTTLE_BASE_DELAY,
            throttle_max_delay: DEFAULT_THROTTLE_MAX_DELAY,
            max_throttle_wait: DEFAULT_MAX_THROTTLE_WAIT,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
            server_error_base_delay: DEFAULT_SERVER_ERROR_BASE_DELAY,
            server_error_max_delay: DEFAULT_SERVER_ERROR_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self.normalized()
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Clamp fields into their valid ranges.
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT);
        self.throttle_max_delay = self.throttle_max_delay.min(self.max_cooldown);
        self.server_error_max_delay = self.server_error_max_delay.max(self.server_error_base_delay);
        self
    }

    /// Computed throttle delay before retry number `attempt` (1-based).
    pub fn throttle_delay(&self, attempt: u32) -> Duration {
        self.apply_jitter(exponential(
            self.throttle_base_delay,
            self.throttle_max_delay,
            attempt,
        ))
    }

    /// Cooldown to persist for a throttled attempt: the provider's hint when
    /// present, otherwise the computed delay, never above `max_cooldown`.
    pub fn cooldown(&self, attempt: u32, provider_hint: Option<Duration>) -> Duration {
        provider_hint
            .unwrap_or_else(|| self.throttle_delay(attempt))
            .min(self.max_cooldown)
    }

    /// Delay after a server error or transport failure on `attempt` (1-based).
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        self.apply_jitter(exponential(
            self.server_error_base_delay,
            self.server_error_max_delay,
            attempt,
        ))
    }

    /// Longest time a single fetch can take:
    /// `attempts × (attempt timeout + longest in-call delay)`.
    pub fn worst_case_latency(&self) -> Duration {
        let longest_delay = self.server_error_max_delay.max(self.max_throttle_wait);
        (self.attempt_timeout + longest_delay) * self.max_attempts
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }
}

/// `base × 2^(attempt - 1)`, capped.
fn exponential(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}
