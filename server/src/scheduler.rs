//! Background backfill of today's rates.
//!
//! Each tick reconciles the current date on its own task, so a slow provider
//! never delays the next tick. Tick failures are logged and swallowed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use exrate_common::{Clock, SystemClock};
use exrate_fx::ReconciliationEngine;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// When backfill ticks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at a fixed UTC time.
    DailyAt(NaiveTime),
    /// At a fixed interval.
    Every(Duration),
}

impl Schedule {
    /// Time left from `now` until the next tick.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Every(interval) => *interval,
            Schedule::DailyAt(at) => {
                let today = now.date_naive().and_time(*at).and_utc();
                let next = if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                };
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::DailyAt(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::DailyAt(at) => write!(f, "daily at {} UTC", at.format("%H:%M")),
            Schedule::Every(interval) => write!(f, "every {}s", interval.as_secs()),
        }
    }
}

/// Periodic reconciliation of the current date.
pub struct BackfillScheduler {
    engine: Arc<ReconciliationEngine>,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackfillScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, schedule: Schedule) -> Self {
        Self {
            engine,
            schedule,
            clock: Arc::new(SystemClock),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Clock used to compute tick times.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Check if the timer task is running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the timer task. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let engine = Arc::clone(&self.engine);
        let clock = Arc::clone(&self.clock);
        let schedule = self.schedule;

        *handle = Some(tokio::spawn(async move {
            info!(schedule = %schedule, "Backfill scheduler started");

            loop {
                let delay = schedule.next_delay(clock.now());
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            run_tick(&engine).await;
                        });
                    }
                }
            }

            info!("Backfill scheduler stopped");
        }));
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        true
    }

    /// Stop the timer task and wait for it to exit.
    ///
    /// Ticks already in flight run to completion on their own.
    pub async fn stop(&self) {
        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Backfill scheduler task ended abnormally");
            }
        }
    }
}

/// Reconcile today once, logging the outcome.
///
/// Returns whether the pass succeeded.
#[instrument(skip_all)]
pub async fn run_tick(engine: &ReconciliationEngine) -> bool {
    let date = engine.today();

    let ok = match engine.reconcile_date(date).await {
        Ok(reconciliation) => {
            info!(
                date = %date,
                cached = reconciliation.cached,
                fetched = reconciliation.fetched,
                "Backfill completed"
            );
            true
        }
        Err(e) => {
            warn!(date = %date, error = %e, kind = %e.kind(), "Backfill failed");
            false
        }
    };

    let metrics = engine.metrics().snapshot();
    info!(
        cache_hits = metrics.cache_hits,
        cache_misses = metrics.cache_misses,
        provider_calls = metrics.provider_calls,
        provider_failures = metrics.provider_failures,
        quotes_persisted = metrics.quotes_persisted,
        reconciliations = metrics.reconciliations,
        "Engine metrics"
    );

    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use exrate_common::{CurrencyCatalog, FixedClock};
    use exrate_fx::{EngineConfig, InMemoryRateCache, MockRateProvider};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
    }

    fn engine() -> (Arc<ReconciliationEngine>, Arc<InMemoryRateCache>, Arc<MockRateProvider>) {
        let catalog = Arc::new(CurrencyCatalog::standard());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_date(day()));
        let cache = Arc::new(InMemoryRateCache::new());
        let provider =
            Arc::new(MockRateProvider::for_catalog(&catalog).with_clock(Arc::clone(&clock)));

        let engine = ReconciliationEngine::new(
            catalog,
            cache.clone(),
            provider.clone(),
            EngineConfig::default(),
        )
        .with_clock(clock);

        (Arc::new(engine), cache, provider)
    }

    #[test]
    fn test_daily_delay() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let schedule = Schedule::DailyAt(noon);

        let morning = Utc.with_ymd_and_hms(2025, 7, 21, 9, 30, 0).unwrap();
        assert_eq!(
            schedule.next_delay(morning),
            Duration::from_secs(2 * 3600 + 30 * 60)
        );

        let evening = Utc.with_ymd_and_hms(2025, 7, 21, 18, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(evening), Duration::from_secs(18 * 3600));

        let exactly = Utc.with_ymd_and_hms(2025, 7, 21, 12, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(exactly), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_schedule_display() {
        assert_eq!(Schedule::default().to_string(), "daily at 12:00 UTC");
        assert_eq!(
            Schedule::Every(Duration::from_secs(90)).to_string(),
            "every 90s"
        );
    }

    #[tokio::test]
    async fn test_run_tick_fills_today() {
        let (engine, cache, provider) = engine();

        assert!(run_tick(&engine).await);
        assert_eq!(cache.quotes_for(day()).len(), 12);
        assert_eq!(provider.date_calls(), 4);
    }

    #[tokio::test]
    async fn test_run_tick_swallows_failures() {
        let (engine, _cache, provider) = engine();
        provider.fail_base("USD");

        assert!(!run_tick(&engine).await);
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle() {
        let (engine, cache, _provider) = engine();
        let scheduler = BackfillScheduler::new(engine, Schedule::Every(Duration::from_millis(10)));

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert_eq!(cache.quotes_for(day()).len(), 12);
    }
}
