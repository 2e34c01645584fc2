//! Per-key mutual exclusion for interval chain writers.
//!
//! [`KeyedLock`] is the seam where a cluster deployment plugs in a
//! distributed lock service. The in-process implementation gives the same
//! at-most-one-writer-per-key guarantee within a single process. Either way
//! the splice write path stays ordered-atomic in the store, so an expired
//! hold cannot tear invariants; a hold overrun is logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::SnapshotError;

/// A held lock. Released on drop.
pub trait LockLease: Send + std::fmt::Debug {}

/// Keyed mutual exclusion with a bounded hold time.
#[async_trait]
pub trait KeyedLock: Send + Sync {
    /// Acquire the lock for `name`. `hold_bound` is the advertised maximum
    /// hold; acquisition failure surfaces as `LockUnavailable`.
    async fn acquire(
        &self,
        name: &str,
        hold_bound: Duration,
    ) -> Result<Box<dyn LockLease>, SnapshotError>;
}

/// In-process keyed mutex registry.
pub struct LocalKeyedLock {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    acquire_timeout: Duration,
}

const SLOT_PRUNE_THRESHOLD: usize = 1024;

impl LocalKeyedLock {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            acquire_timeout,
        }
    }

    fn slot(&self, name: &str) -> Result<Arc<tokio::sync::Mutex<()>>, SnapshotError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| SnapshotError::LockUnavailable(format!("{name}: registry poisoned")))?;
        if slots.len() >= SLOT_PRUNE_THRESHOLD {
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        Ok(slots.entry(name.to_string()).or_default().clone())
    }
}

#[derive(Debug)]
struct LocalLease {
    _guard: OwnedMutexGuard<()>,
    name: String,
    acquired_at: Instant,
    hold_bound: Duration,
}

impl LockLease for LocalLease {}

impl Drop for LocalLease {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        if held > self.hold_bound {
            tracing::warn!(
                target: "snapshot_core::lock",
                name = %self.name,
                held_ms = held.as_millis() as u64,
                bound_ms = self.hold_bound.as_millis() as u64,
                "lock held past its bound"
            );
        }
    }
}

#[async_trait]
impl KeyedLock for LocalKeyedLock {
    async fn acquire(
        &self,
        name: &str,
        hold_bound: Duration,
    ) -> Result<Box<dyn LockLease>, SnapshotError> {
        let slot = self.slot(name)?;
        let guard = tokio::time::timeout(self.acquire_timeout, slot.lock_owned())
            .await
            .map_err(|_| SnapshotError::LockUnavailable(name.to_string()))?;
        Ok(Box::new(LocalLease {
            _guard: guard,
            name: name.to_string(),
            acquired_at: Instant::now(),
            hold_bound,
        }))
    }
}
