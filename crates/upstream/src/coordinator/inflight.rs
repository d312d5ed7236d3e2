//! In-process registry of in-flight fetches.
//!
//! Maps a request signature to a shared pending result so that concurrent
//! callers for the same resource ride on one network operation. The registry
//! is scoped to one process instance; separate instances coalesce nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::warn;

use crate::errors::FetchError;
use crate::models::FetchOutcome;

pub type FetchResult = Result<FetchOutcome, FetchError>;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct Entry {
    generation: u64,
    fetch: SharedFetch,
}

/// Whether the caller started the operation or joined an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    Leader,
    Follower,
}

pub struct InflightRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Lock the entries mutex, recovering from poison if necessary.
    ///
    /// The lock is never held across an await; a poisoned map is still a
    /// consistent map.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("In-flight registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Join the in-flight operation for `signature`, or register a new one.
    ///
    /// `start` receives the generation id of the new entry and must arrange
    /// for [`settle`](Self::settle) to be called with it once done, typically
    /// through a [`SettleGuard`].
    pub(crate) fn join_or_start<F>(&self, signature: &str, start: F) -> (SharedFetch, Role)
    where
        F: FnOnce(u64) -> BoxFuture<'static, FetchResult>,
    {
        let mut entries = self.lock_entries();

        if let Some(entry) = entries.get(signature) {
            return (entry.fetch.clone(), Role::Follower);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fetch = start(generation).shared();
        entries.insert(
            signature.to_string(),
            Entry {
                generation,
                fetch: fetch.clone(),
            },
        );

        (fetch, Role::Leader)
    }

    /// Remove the entry for `signature` if it still belongs to `generation`.
    pub(crate) fn settle(&self, signature: &str, generation: u64) {
        let mut entries = self.lock_entries();
        if entries
            .get(signature)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(signature);
        }
    }

    /// Number of operations currently in flight.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Settles a registry entry when dropped, including on panic or abort.
pub(crate) struct SettleGuard {
    registry: Arc<InflightRegistry>,
    signature: String,
    generation: u64,
}

impl SettleGuard {
    pub(crate) fn new(registry: Arc<InflightRegistry>, signature: String, generation: u64) -> Self {
        Self {
            registry,
            signature,
            generation,
        }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.registry.settle(&self.signature, self.generation);
    }
}

impl Default for InflightRegistry {
    fn default() -> Self {
        Self::new()
    }
}
