//! Composition root: wires stores, provider, engine, scheduler and routes.

use std::sync::Arc;

use axum::Router;
use chrono::NaiveDate;
use exrate_common::{Clock, RateError, RateResult, SystemClock};
use exrate_fx::{
    FreeCurrencyConfig, FreeCurrencyProvider, InMemoryRateCache, RateCache, RateProvider,
    ReconciliationEngine,
};
use exrate_storage::{
    AccessGate, ActionLog, MemoryAccessGate, MemoryActionLog, PgAccessGate, PgActionLog,
    PgRateCache,
};
use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::api::{self, AppState};
use crate::config::ServiceConfig;
use crate::scheduler::BackfillScheduler;
use crate::state::ServiceState;

/// The running exrate service.
pub struct RateService {
    config: ServiceConfig,
    state: RwLock<ServiceState>,
    app: Arc<AppState>,
    scheduler: Option<BackfillScheduler>,
}

impl RateService {
    /// Build the service from configuration.
    ///
    /// Connects to Postgres and creates the schema when a database is
    /// configured, otherwise falls back to in-memory stores.
    pub async fn build(config: ServiceConfig) -> RateResult<Self> {
        let (cache, access, actions): (
            Arc<dyn RateCache>,
            Arc<dyn AccessGate>,
            Arc<dyn ActionLog>,
        ) = match &config.storage.database {
            Some(options) => {
                let pool = exrate_storage::connect(options.clone(), &config.storage.pool).await?;
                exrate_storage::initialize_schema(&pool).await?;
                (
                    Arc::new(PgRateCache::new(pool.clone())),
                    Arc::new(PgAccessGate::new(pool.clone())),
                    Arc::new(PgActionLog::new(pool)),
                )
            }
            None => {
                warn!("No database configured, rates and API keys will not survive a restart");
                (
                    Arc::new(InMemoryRateCache::new()),
                    Arc::new(MemoryAccessGate::new()),
                    Arc::new(MemoryActionLog::new()),
                )
            }
        };

        let provider = FreeCurrencyProvider::new(FreeCurrencyConfig {
            base_url: config.provider.base_url.clone(),
            api_key: config.provider.api_key.clone(),
            timeout: config.provider.timeout,
        })
        .map_err(|e| RateError::provider("provider.init", e))?;

        Ok(Self::from_parts(
            config,
            cache,
            Arc::new(provider),
            access,
            actions,
            Arc::new(SystemClock),
        ))
    }

    /// Assemble the service from ready-made parts.
    pub fn from_parts(
        config: ServiceConfig,
        cache: Arc<dyn RateCache>,
        provider: Arc<dyn RateProvider>,
        access: Arc<dyn AccessGate>,
        actions: Arc<dyn ActionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = Arc::new(
            ReconciliationEngine::new(
                Arc::new(config.catalog.clone()),
                cache,
                provider,
                config.engine.clone(),
            )
            .with_clock(Arc::clone(&clock)),
        );

        let scheduler = config.scheduler.enabled.then(|| {
            BackfillScheduler::new(Arc::clone(&engine), config.scheduler.schedule)
                .with_clock(Arc::clone(&clock))
        });

        let app = Arc::new(AppState {
            engine,
            access,
            actions,
            clock,
        });

        Self {
            config,
            state: RwLock::new(ServiceState::Starting),
            app,
            scheduler,
        }
    }

    /// Run startup work and start the scheduler.
    ///
    /// Seeding failures are logged; they never abort startup.
    #[instrument(skip(self))]
    pub async fn start(&self) -> RateResult<()> {
        info!("Starting rate service");

        if let Some(key) = &self.config.bootstrap.default_api_key {
            self.app.access.register(key).await?;
            info!("Default API key registered");
        }

        for date in self.seed_dates() {
            match self.app.engine.reconcile_date(date).await {
                Ok(reconciliation) => info!(
                    date = %date,
                    cached = reconciliation.cached,
                    fetched = reconciliation.fetched,
                    "Seeded rates"
                ),
                Err(e) => warn!(date = %date, error = %e, "Seeding failed"),
            }
        }

        if let Some(scheduler) = &self.scheduler {
            scheduler.start();
        }

        *self.state.write() = ServiceState::Running;
        info!(
            pairs = self.config.catalog.pair_count(),
            scheduler = self.scheduler.is_some(),
            "Rate service started"
        );
        Ok(())
    }

    /// Stop the scheduler.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping rate service");
        *self.state.write() = ServiceState::ShuttingDown;

        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
        }

        *self.state.write() = ServiceState::Stopped;
        info!("Rate service stopped");
    }

    /// Routes serving the public API.
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.app))
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.app.engine
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Configured seed dates followed by today, without duplicates.
    fn seed_dates(&self) -> Vec<NaiveDate> {
        let mut dates = self.config.bootstrap.seed_dates.clone();
        dates.push(self.app.engine.today());

        let mut seen = std::collections::HashSet::new();
        dates.retain(|date| seen.insert(*date));
        dates
    }
}
