//! Entry Locks
//!
//! Per-key mutual exclusion between local readers and coordinator-driven
//! writes. Each key has a single holder slot; waiters queue in arrival
//! order. Reservations and releases are separate calls because a
//! transaction locks in one request and unlocks in another.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Owner token used by reservations outside of a transaction
pub const ANONYMOUS_OWNER: &str = "";

/// Holder slot of a single key
struct Slot {
    /// One permit; fair, so waiters are served FIFO
    permit: Semaphore,
    /// Current holder, if any
    holder: Mutex<Option<String>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
            holder: Mutex::new(None),
        }
    }
}

/// Table of per-key locks
#[derive(Default)]
pub struct EntryLock {
    /// Slots by key. Only held while looking a slot up, never while waiting.
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl EntryLock {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Wait until `key` is free, then hold it for `owner`
    pub async fn reserve(&self, key: &str, owner: &str) {
        let slot = self.slot(key);

        match slot.permit.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => unreachable!("entry lock semaphores are never closed"),
        }
        *slot.holder.lock() = Some(owner.to_string());

        tracing::trace!("Reserved {} for '{}'", key, owner);
    }

    /// Reserve `key` without a transaction
    pub async fn reserve_anonymous(&self, key: &str) {
        self.reserve(key, ANONYMOUS_OWNER).await
    }

    /// Vacate the holder slot of `key`, letting the next waiter in.
    ///
    /// Releasing a key that is not held does nothing. The owner is not
    /// required to match the holder.
    pub fn release(&self, key: &str, owner: &str) {
        let slot = match self.slots.lock().get(key) {
            Some(slot) => Arc::clone(slot),
            None => {
                tracing::debug!("Releasing an unlocked entry {}", key);
                return;
            }
        };

        let previous = slot.holder.lock().take();
        match previous {
            Some(holder) => {
                if holder != owner {
                    tracing::debug!(
                        "Entry {} held by '{}' released by '{}'",
                        key,
                        holder,
                        owner
                    );
                }
                slot.permit.add_permits(1);
                tracing::trace!("Released {}", key);
            }
            None => {
                tracing::debug!("Releasing an unlocked entry {}", key);
            }
        }
    }

    /// Release an anonymous reservation
    pub fn release_anonymous(&self, key: &str) {
        self.release(key, ANONYMOUS_OWNER)
    }

    /// Whether `key` currently has a holder
    pub fn is_held(&self, key: &str) -> bool {
        self.holder(key).is_some()
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &str) -> Option<String> {
        let slot = self.slots.lock().get(key).cloned()?;
        let holder = slot.holder.lock().clone();
        holder
    }
}
