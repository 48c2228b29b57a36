//! Per-key single-flight slots for cache misses.
//!
//! Concurrent `get_current` calls for the same pair and day queue on one
//! slot. The first holder fetches and writes the cache; the others wake up
//! after it and re-read the cache before deciding to fetch themselves.

use std::sync::Arc;

use dashmap::DashMap;
use exrate_common::QuoteKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of in-flight cache fills.
#[derive(Debug, Default)]
pub struct InflightFetches {
    slots: Arc<DashMap<QuoteKey, Arc<Mutex<()>>>>,
}

impl InflightFetches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the slot for `key`.
    pub async fn acquire(&self, key: &QuoteKey) -> InflightGuard {
        let (slot, follower) = {
            let mut follower = true;
            let slot = self
                .slots
                .entry(key.clone())
                .or_insert_with(|| {
                    follower = false;
                    Arc::new(Mutex::new(()))
                })
                .clone();
            (slot, follower)
        };

        let guard = slot.lock_owned().await;

        InflightGuard {
            slots: Arc::clone(&self.slots),
            key: key.clone(),
            follower,
            guard: Some(guard),
        }
    }

    /// Number of keys with a holder or waiters.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive hold on one key's slot. Released on drop.
#[derive(Debug)]
pub struct InflightGuard {
    slots: Arc<DashMap<QuoteKey, Arc<Mutex<()>>>>,
    key: QuoteKey,
    follower: bool,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InflightGuard {
    /// True if another caller held the slot when this one arrived.
    pub fn is_follower(&self) -> bool {
        self.follower
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the slot: no holder, no waiters.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exrate_common::CurrencyCatalog;
    use std::time::Duration;

    fn key() -> QuoteKey {
        let catalog = CurrencyCatalog::standard();
        QuoteKey::new(
            catalog.validate("USD").unwrap(),
            catalog.validate("EUR").unwrap(),
            chrono::NaiveDate::from_ymd_opt(2025, 7, 21).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_slot_removed_after_release() {
        let inflight = InflightFetches::new();

        let guard = inflight.acquire(&key()).await;
        assert!(!guard.is_follower());
        assert_eq!(inflight.len(), 1);

        drop(guard);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_second_caller_waits_and_follows() {
        let inflight = Arc::new(InflightFetches::new());
        let guard = inflight.acquire(&key()).await;

        let waiter = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                let guard = inflight.acquire(&key()).await;
                guard.is_follower()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.unwrap());
        assert!(inflight.is_empty());
    }
}
