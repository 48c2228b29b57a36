//! Cache-first rate reconciliation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use exrate_common::time::parse_date;
use exrate_common::{
    Clock, Currency, CurrencyCatalog, Quote, QuoteKey, RateError, RateResult, SystemClock,
};
use tracing::{debug, info, instrument, warn};

use crate::cache::RateCache;
use crate::error::ProviderError;
use crate::inflight::InflightFetches;
use crate::metrics::EngineMetrics;
use crate::provider::RateProvider;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on every cache and provider call.
    pub call_timeout: Duration,
    /// Collapse concurrent `get_current` misses for one key into one fetch.
    pub coalesce_misses: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            coalesce_misses: true,
        }
    }
}

/// Outcome of reconciling one date.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Date that was reconciled.
    pub date: NaiveDate,
    /// Every quote known for the date after the pass, in no particular order.
    pub quotes: Vec<Quote>,
    /// Quotes answered from the cache.
    pub cached: usize,
    /// Quotes fetched and persisted by this pass.
    pub fetched: usize,
}

/// Targets of one base that the cache did not have.
struct MissingTargets<'a> {
    base: &'a Currency,
    targets: &'a [Currency],
    absent: HashSet<Currency>,
}

/// Orchestrates cache lookups, provider fetches and cache writes.
///
/// The cache is always consulted first and the provider is only asked for
/// data the cache lacks. Quotes are written back only after a successful
/// fetch.
pub struct ReconciliationEngine {
    catalog: Arc<CurrencyCatalog>,
    cache: Arc<dyn RateCache>,
    provider: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
    inflight: InflightFetches,
    metrics: Arc<EngineMetrics>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    /// Create a new engine on the system clock.
    pub fn new(
        catalog: Arc<CurrencyCatalog>,
        cache: Arc<dyn RateCache>,
        provider: Arc<dyn RateProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            cache,
            provider,
            clock: Arc::new(SystemClock),
            inflight: InflightFetches::new(),
            metrics: Arc::new(EngineMetrics::new()),
            config,
        }
    }

    /// Replace the clock that decides what "today" is.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &CurrencyCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current UTC day according to the engine clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Get today's rate for one pair.
    ///
    /// Answers from the cache when possible. On a miss, fetches the latest
    /// rate once and stores it before returning. A provider failure leaves
    /// the cache untouched.
    #[instrument(skip(self))]
    pub async fn get_current(&self, base: &str, target: &str) -> RateResult<Quote> {
        let base = self.catalog.validate(base)?;
        let target = self.catalog.validate(target)?;

        let today = self.today();
        if let Some(quote) = self.lookup(&base, &target, today).await? {
            return Ok(quote);
        }

        let _slot = if self.config.coalesce_misses {
            let key = QuoteKey::new(base.clone(), target.clone(), today);
            let slot = self.inflight.acquire(&key).await;
            if slot.is_follower() {
                if let Some(quote) = self.lookup(&base, &target, today).await? {
                    debug!(key = %key, "Filled by concurrent fetch");
                    return Ok(quote);
                }
            }
            Some(slot)
        } else {
            None
        };

        let quote = self
            .call_provider(
                "provider.fetch_latest",
                self.provider.fetch_latest(&base, &target),
            )
            .await?
            .with_date(today);

        self.persist(vec![quote.clone()]).await?;

        info!(rate = %quote.rate(), date = %quote.date(), "Fetched current rate");
        Ok(quote)
    }

    /// Get every catalog pair's rate for a `YYYY-MM-DD` date.
    pub async fn get_for_date(&self, date: &str) -> RateResult<Vec<Quote>> {
        let date = parse_date(date)?;
        Ok(self.reconcile_date(date).await?.quotes)
    }

    /// Bring the cache up to date for every catalog pair on `date`.
    ///
    /// Bases are processed in catalog order. Each base with at least one
    /// missing target is fetched with all of its configured targets, but only
    /// the missing pairs are persisted. The first failing base aborts the
    /// pass; bases persisted before it stay persisted.
    #[instrument(skip_all, fields(date = %date))]
    pub async fn reconcile_date(&self, date: NaiveDate) -> RateResult<Reconciliation> {
        let mut quotes = Vec::with_capacity(self.catalog.pair_count());
        let mut missing: Vec<MissingTargets<'_>> = Vec::new();

        for (base, targets) in self.catalog.pairs() {
            let mut absent = HashSet::new();
            for target in targets {
                match self.lookup(base, target, date).await? {
                    Some(quote) => quotes.push(quote),
                    None => {
                        absent.insert(target.clone());
                    }
                }
            }
            if !absent.is_empty() {
                missing.push(MissingTargets {
                    base,
                    targets,
                    absent,
                });
            }
        }

        let cached = quotes.len();
        let mut fetched = 0;

        for entry in missing {
            let result = self
                .call_provider(
                    "provider.fetch_for_date",
                    self.provider.fetch_for_date(entry.base, entry.targets, date),
                )
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        base = %entry.base,
                        persisted = fetched,
                        error = %e,
                        "Reconciliation stopped at failing base"
                    );
                    return Err(e);
                }
            };

            let fresh: Vec<Quote> = response
                .into_iter()
                .filter(|quote| quote.base() == entry.base && entry.absent.contains(quote.target()))
                .collect();

            self.persist(fresh.clone()).await?;
            fetched += fresh.len();
            quotes.extend(fresh);
        }

        self.metrics.reconciliation_completed();
        info!(cached, fetched, "Reconciled date");

        Ok(Reconciliation {
            date,
            quotes,
            cached,
            fetched,
        })
    }

    async fn lookup(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> RateResult<Option<Quote>> {
        const OP: &str = "cache.get";

        let found = tokio::time::timeout(self.config.call_timeout, self.cache.get(base, target, date))
            .await
            .map_err(|e| RateError::storage(OP, e))??;

        if found.is_some() {
            self.metrics.cache_hit();
            debug!(base = %base, target = %target, date = %date, "Cache hit");
        } else {
            self.metrics.cache_miss();
            debug!(base = %base, target = %target, date = %date, "Cache miss");
        }

        Ok(found)
    }

    async fn call_provider<T, F>(&self, operation: &'static str, call: F) -> RateResult<T>
    where
        F: Future<Output = RateResult<T>>,
    {
        let result = match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RateError::provider(
                operation,
                ProviderError::Timeout(self.config.call_timeout),
            )),
        };

        self.metrics.provider_call(result.is_ok());
        result
    }

    /// Write quotes on a detached task so an abandoned caller cannot cut the
    /// write short.
    async fn persist(&self, quotes: Vec<Quote>) -> RateResult<()> {
        const OP: &str = "cache.set";

        if quotes.is_empty() {
            return Ok(());
        }

        let count = quotes.len();
        let cache = Arc::clone(&self.cache);
        let timeout = self.config.call_timeout;

        let write = tokio::spawn(async move {
            for quote in &quotes {
                tokio::time::timeout(timeout, cache.set(quote))
                    .await
                    .map_err(|e| RateError::storage(OP, e))??;
            }
            Ok::<(), RateError>(())
        });

        write.await.map_err(|e| RateError::storage(OP, e))??;
        self.metrics.quotes_persisted(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryRateCache;
    use crate::provider::MockRateProvider;
    use async_trait::async_trait;
    use exrate_common::{ErrorKind, FixedClock};
    use rust_decimal::Decimal;
    use std::error::Error as _;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_date(day()))
    }

    struct Harness {
        catalog: Arc<CurrencyCatalog>,
        cache: Arc<InMemoryRateCache>,
        provider: Arc<MockRateProvider>,
        engine: ReconciliationEngine,
    }

    fn harness_with(config: EngineConfig) -> Harness {
        let catalog = Arc::new(CurrencyCatalog::standard());
        let cache = Arc::new(InMemoryRateCache::new());
        let provider = Arc::new(MockRateProvider::for_catalog(&catalog).with_clock(clock()));

        let engine = ReconciliationEngine::new(
            Arc::clone(&catalog),
            cache.clone(),
            provider.clone(),
            config,
        )
        .with_clock(clock());

        Harness {
            catalog,
            cache,
            provider,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(EngineConfig::default())
    }

    fn quote(catalog: &CurrencyCatalog, base: &str, target: &str, rate: Decimal) -> Quote {
        Quote::new(
            catalog.validate(base).unwrap(),
            catalog.validate(target).unwrap(),
            rate,
            day(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_current_is_served_from_cache_after_first_call() {
        let h = harness();

        let first = h.engine.get_current("USD", "EUR").await.unwrap();
        let second = h.engine.get_current("usd", " eur ").await.unwrap();

        assert_eq!(first.rate(), second.rate());
        assert_eq!(h.provider.latest_calls(), 1);
        assert_eq!(h.cache.len(), 1);

        let snapshot = h.engine.metrics().snapshot();
        assert_eq!(snapshot.provider_calls, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.quotes_persisted, 1);
    }

    #[tokio::test]
    async fn test_get_current_validates_before_any_call() {
        let h = harness();

        let err = h.engine.get_current("XYZ", "USD").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h.engine.get_current("USD", "EURO").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(h.provider.latest_calls(), 0);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_current_same_currency_goes_to_provider() {
        let h = harness();
        h.provider.set_rate("USD", "USD", Decimal::ONE);

        let quote = h.engine.get_current("USD", "usd").await.unwrap();
        assert_eq!(quote.rate(), Decimal::ONE);
        assert_eq!(h.provider.latest_calls(), 1);
        assert_eq!(h.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_current_is_keyed_by_engine_day() {
        let catalog = Arc::new(CurrencyCatalog::standard());
        let cache = Arc::new(InMemoryRateCache::new());
        let next_day: Arc<dyn Clock> = Arc::new(FixedClock::at_date(day().succ_opt().unwrap()));
        let provider = Arc::new(MockRateProvider::for_catalog(&catalog).with_clock(next_day));
        let engine = ReconciliationEngine::new(
            catalog,
            cache.clone(),
            provider.clone(),
            EngineConfig::default(),
        )
        .with_clock(clock());

        let quote = engine.get_current("USD", "EUR").await.unwrap();
        assert_eq!(quote.date(), day());
        assert_eq!(cache.quotes_for(day()).len(), 1);

        engine.get_current("USD", "EUR").await.unwrap();
        assert_eq!(provider.latest_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_current_provider_failure_caches_nothing() {
        let h = harness();
        h.provider.fail_base("USD");

        let err = h.engine.get_current("USD", "JPY").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(h.cache.is_empty());
        assert_eq!(h.engine.metrics().snapshot().provider_failures, 1);
    }

    #[tokio::test]
    async fn test_get_current_zero_rate_is_provider_error() {
        let h = harness();
        h.provider.set_rate("USD", "JPY", Decimal::ZERO);

        let err = h.engine.get_current("USD", "JPY").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_for_date_fully_cached_makes_no_calls() {
        let h = harness();
        for pair in h.catalog.all_pairs() {
            let q = Quote::new(pair.base, pair.target, Decimal::ONE, day()).unwrap();
            h.cache.set(&q).await.unwrap();
        }

        let quotes = h.engine.get_for_date("2025-07-21").await.unwrap();
        assert_eq!(quotes.len(), 12);
        assert_eq!(h.provider.date_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_for_date_empty_cache_fetches_each_base_once() {
        let h = harness();

        let reconciliation = h.engine.reconcile_date(day()).await.unwrap();
        assert_eq!(reconciliation.quotes.len(), 12);
        assert_eq!(reconciliation.fetched, 12);
        assert_eq!(reconciliation.cached, 0);
        assert_eq!(h.cache.quotes_for(day()).len(), 12);

        let requests = h.provider.date_requests();
        assert_eq!(requests.len(), 4);
        let bases: Vec<&str> = requests.iter().map(|(b, _, _)| b.as_str()).collect();
        assert_eq!(bases, vec!["USD", "RUB", "EUR", "JPY"]);
        assert_eq!(requests[0].1, vec!["RUB", "EUR", "JPY"]);
        assert!(requests.iter().all(|(_, _, d)| *d == day()));
    }

    #[tokio::test]
    async fn test_get_for_date_failing_base_keeps_earlier_bases() {
        let h = harness();
        h.provider.fail_base("EUR");

        let err = h.engine.get_for_date("2025-07-21").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.source().unwrap().to_string().contains("EUR"));

        // USD and RUB were persisted before EUR failed; JPY was never asked.
        assert_eq!(h.provider.date_calls(), 3);
        let stored = h.cache.quotes_for(day());
        assert_eq!(stored.len(), 6);
        assert!(stored
            .iter()
            .all(|q| q.base().code() == "USD" || q.base().code() == "RUB"));
    }

    #[tokio::test]
    async fn test_get_for_date_zero_rate_fails_without_storing_zero() {
        let h = harness();
        h.provider.set_rate("USD", "JPY", Decimal::ZERO);

        let err = h.engine.get_for_date("2025-07-21").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_for_date_only_persists_missing_pairs() {
        let h = harness();
        let pinned = quote(&h.catalog, "USD", "EUR", Decimal::new(42, 0));
        h.cache.set(&pinned).await.unwrap();

        let reconciliation = h.engine.reconcile_date(day()).await.unwrap();
        assert_eq!(reconciliation.cached, 1);
        assert_eq!(reconciliation.fetched, 11);
        assert_eq!(reconciliation.quotes.len(), 12);

        // USD was fetched with all of its targets, but the cached pair kept
        // its rate.
        let requests = h.provider.date_requests();
        assert_eq!(requests[0].1, vec!["RUB", "EUR", "JPY"]);

        let usd = h.catalog.validate("USD").unwrap();
        let eur = h.catalog.validate("EUR").unwrap();
        let stored = h.cache.get(&usd, &eur, day()).await.unwrap().unwrap();
        assert_eq!(stored.rate(), Decimal::new(42, 0));
    }

    #[tokio::test]
    async fn test_get_for_date_rejects_bad_date() {
        let h = harness();

        for raw in ["2025-7-21", "yesterday", "2025-02-30"] {
            let err = h.engine.get_for_date(raw).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(h.provider.date_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let h = harness();
        h.provider.set_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            h.engine.get_current("USD", "EUR"),
            h.engine.get_current("USD", "EUR")
        );

        assert_eq!(a.unwrap().rate(), b.unwrap().rate());
        assert_eq!(h.provider.latest_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_without_coalescing() {
        let h = harness_with(EngineConfig {
            coalesce_misses: false,
            ..EngineConfig::default()
        });
        h.provider.set_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            h.engine.get_current("USD", "EUR"),
            h.engine.get_current("USD", "EUR")
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(h.provider.latest_calls(), 2);
        assert_eq!(h.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let h = harness_with(EngineConfig {
            call_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        });
        h.provider.set_delay(Duration::from_millis(500));

        let err = h.engine.get_current("USD", "EUR").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.operation(), "provider.fetch_latest");
        assert!(err.source().unwrap().to_string().contains("timed out"));
        assert!(h.cache.is_empty());
    }

    struct BrokenCache;

    #[async_trait]
    impl RateCache for BrokenCache {
        async fn get(
            &self,
            _base: &Currency,
            _target: &Currency,
            _date: NaiveDate,
        ) -> RateResult<Option<Quote>> {
            Err(RateError::storage("cache.get", "connection refused"))
        }

        async fn set(&self, _quote: &Quote) -> RateResult<()> {
            Err(RateError::storage("cache.set", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let catalog = Arc::new(CurrencyCatalog::standard());
        let provider = Arc::new(MockRateProvider::for_catalog(&catalog));
        let engine = ReconciliationEngine::new(
            catalog,
            Arc::new(BrokenCache),
            provider.clone(),
            EngineConfig::default(),
        );

        let err = engine.get_current("USD", "EUR").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(provider.latest_calls(), 0);

        let err = engine.get_for_date("2025-07-21").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(provider.date_calls(), 0);
    }
}
