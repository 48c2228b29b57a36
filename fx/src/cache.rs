//! Quote cache interface and the in-memory implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use exrate_common::{Currency, Quote, QuoteKey, RateResult};
use tracing::debug;

/// Durable store of quotes keyed by (base, target, date).
///
/// Implementations must be safe for concurrent use. `set` is an upsert: a
/// second write for the same key replaces the rate and never adds a row.
#[async_trait]
pub trait RateCache: Send + Sync {
    /// Get the stored quote for an exact key, or `None` if absent.
    async fn get(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> RateResult<Option<Quote>>;

    /// Insert or overwrite the quote for its key.
    async fn set(&self, quote: &Quote) -> RateResult<()>;
}

/// Thread-safe in-process quote store.
///
/// Used when no database is configured and as the reference implementation
/// of the upsert contract in tests.
#[derive(Debug, Default)]
pub struct InMemoryRateCache {
    quotes: DashMap<QuoteKey, Quote>,
}

impl InMemoryRateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored quotes.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Check whether a key is stored.
    pub fn contains(&self, key: &QuoteKey) -> bool {
        self.quotes.contains_key(key)
    }

    /// Get every quote stored for `date`.
    pub fn quotes_for(&self, date: NaiveDate) -> Vec<Quote> {
        self.quotes
            .iter()
            .filter(|entry| entry.key().date == date)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove all quotes.
    pub fn clear(&self) {
        self.quotes.clear();
    }
}

#[async_trait]
impl RateCache for InMemoryRateCache {
    async fn get(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> RateResult<Option<Quote>> {
        let key = QuoteKey::new(base.clone(), target.clone(), date);
        Ok(self.quotes.get(&key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, quote: &Quote) -> RateResult<()> {
        let key = quote.key();
        debug!(key = %key, rate = %quote.rate(), "Storing quote");
        self.quotes.insert(key, quote.clone());
        Ok(())
    }
}
