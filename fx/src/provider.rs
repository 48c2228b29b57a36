//! Rate provider trait and the test double.

use async_trait::async_trait;
use chrono::NaiveDate;
use exrate_common::{Currency, Quote, RateResult};

/// Upstream source of truth for quotes.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the current quote for one pair.
    async fn fetch_latest(&self, base: &Currency, target: &Currency) -> RateResult<Quote>;

    /// Get quotes for one base against several targets on `date`.
    ///
    /// Either every requested target comes back with a positive rate or the
    /// whole call fails; a partial answer is never returned.
    async fn fetch_for_date(
        &self,
        base: &Currency,
        targets: &[Currency],
        date: NaiveDate,
    ) -> RateResult<Vec<Quote>>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateProvider;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use exrate_common::{Clock, Currency, Quote, RateError, RateResult, SystemClock};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::RateProvider;
    use crate::error::ProviderError;

    /// In-process provider with call counters and failure injection.
    pub struct MockRateProvider {
        rates: Mutex<HashMap<(String, String), Decimal>>,
        failing_bases: Mutex<HashSet<String>>,
        date_requests: Mutex<Vec<(String, Vec<String>, NaiveDate)>>,
        latest_calls: AtomicUsize,
        date_calls: AtomicUsize,
        delay: Mutex<Option<Duration>>,
        clock: Arc<dyn Clock>,
    }

    impl MockRateProvider {
        /// Create a provider with no rates.
        pub fn new() -> Self {
            Self {
                rates: Mutex::new(HashMap::new()),
                failing_bases: Mutex::new(HashSet::new()),
                date_requests: Mutex::new(Vec::new()),
                latest_calls: AtomicUsize::new(0),
                date_calls: AtomicUsize::new(0),
                delay: Mutex::new(None),
                clock: Arc::new(SystemClock),
            }
        }

        /// Create a provider quoting every pair of `catalog`.
        ///
        /// Rates are distinct per pair so tests can tell them apart.
        pub fn for_catalog(catalog: &exrate_common::CurrencyCatalog) -> Self {
            let provider = Self::new();
            for (i, pair) in catalog.all_pairs().enumerate() {
                provider.set_rate(
                    pair.base.code(),
                    pair.target.code(),
                    Decimal::new(100 + i as i64, 2),
                );
            }
            provider
        }

        /// Date `fetch_latest` stamps its quotes with.
        pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
            self.clock = clock;
            self
        }

        /// Set a rate for a pair. A zero rate means "no data".
        pub fn set_rate(&self, base: &str, target: &str, rate: Decimal) {
            self.rates
                .lock()
                .insert((base.to_string(), target.to_string()), rate);
        }

        /// Make every call for `base` fail.
        pub fn fail_base(&self, base: &str) {
            self.failing_bases.lock().insert(base.to_string());
        }

        /// Delay every call by `delay`.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of `fetch_latest` calls.
        pub fn latest_calls(&self) -> usize {
            self.latest_calls.load(Ordering::SeqCst)
        }

        /// Number of `fetch_for_date` calls.
        pub fn date_calls(&self) -> usize {
            self.date_calls.load(Ordering::SeqCst)
        }

        /// Every `fetch_for_date` request as (base, targets, date).
        pub fn date_requests(&self) -> Vec<(String, Vec<String>, NaiveDate)> {
            self.date_requests.lock().clone()
        }

        async fn pause(&self) {
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        fn check_base(&self, operation: &'static str, base: &Currency) -> RateResult<()> {
            if self.failing_bases.lock().contains(base.code()) {
                return Err(RateError::provider(
                    operation,
                    ProviderError::Unavailable(format!("injected failure for {}", base)),
                ));
            }
            Ok(())
        }

        fn quote(
            &self,
            operation: &'static str,
            base: &Currency,
            target: &Currency,
            date: NaiveDate,
        ) -> RateResult<Quote> {
            let rate = self
                .rates
                .lock()
                .get(&(base.code().to_string(), target.code().to_string()))
                .copied()
                .filter(|rate| !rate.is_zero())
                .ok_or_else(|| {
                    RateError::provider(
                        operation,
                        ProviderError::NoData {
                            base: base.to_string(),
                            target: target.to_string(),
                        },
                    )
                })?;

            Quote::new(base.clone(), target.clone(), rate, date)
                .map_err(|e| RateError::provider(operation, ProviderError::InvalidRate(e)))
        }
    }

    impl Default for MockRateProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RateProvider for MockRateProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_latest(&self, base: &Currency, target: &Currency) -> RateResult<Quote> {
            const OP: &str = "mock.fetch_latest";

            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.check_base(OP, base)?;
            self.quote(OP, base, target, self.clock.today())
        }

        async fn fetch_for_date(
            &self,
            base: &Currency,
            targets: &[Currency],
            date: NaiveDate,
        ) -> RateResult<Vec<Quote>> {
            const OP: &str = "mock.fetch_for_date";

            self.date_calls.fetch_add(1, Ordering::SeqCst);
            self.date_requests.lock().push((
                base.to_string(),
                targets.iter().map(|t| t.to_string()).collect(),
                date,
            ));
            self.pause().await;
            self.check_base(OP, base)?;

            targets
                .iter()
                .map(|target| self.quote(OP, base, target, date))
                .collect()
        }
    }
}
