//! Counters for engine monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Reconciliation engine metrics.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Lookups answered from the cache.
    pub cache_hits: AtomicU64,
    /// Lookups that had to go to the provider.
    pub cache_misses: AtomicU64,
    /// Calls made to the provider.
    pub provider_calls: AtomicU64,
    /// Provider calls that failed.
    pub provider_failures: AtomicU64,
    /// Quotes written to the cache.
    pub quotes_persisted: AtomicU64,
    /// Completed date reconciliations.
    pub reconciliations: AtomicU64,
}

impl EngineMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a provider call and its outcome.
    pub fn provider_call(&self, ok: bool) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.provider_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn quotes_persisted(&self, count: usize) {
        self.quotes_persisted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn reconciliation_completed(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            quotes_persisted: self.quotes_persisted.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
    pub quotes_persisted: u64,
    pub reconciliations: u64,
}

impl EngineMetricsSnapshot {
    /// Share of lookups answered from the cache, or `None` before any lookup.
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            None
        } else {
            Some(self.cache_hits as f64 / total as f64)
        }
    }
}
