//! Wall-clock abstraction.
//!
//! Cooldowns are persisted as absolute UTC timestamps so they survive across
//! process instances. The coordinator reads the time through [`Clock`] so tests
//! can run on tokio's paused clock.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// UTC time derived from tokio's clock.
///
/// Anchored to a UTC instant at construction and advanced by
/// `tokio::time::Instant`, so with a paused runtime it moves exactly as far as
/// `tokio::time::sleep` / `tokio::time::advance` do.
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    anchor_utc: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(anchor_utc: DateTime<Utc>) -> Self {
        Self {
            anchor_utc,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor.elapsed();
        self.anchor_utc
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
