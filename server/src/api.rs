//! HTTP request boundary.
//!
//! Every request is recorded in the action log, then its API key is checked,
//! and only then does it reach the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use exrate_common::{Clock, Quote, RateError, RateResult};
use exrate_fx::ReconciliationEngine;
use exrate_storage::{AccessGate, ActionKind, ActionLog};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiResult;

/// Shared handler state.
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub access: Arc<dyn AccessGate>,
    pub actions: Arc<dyn ActionLog>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Record the action. Failures are logged and never fail the request.
    async fn record(&self, kind: ActionKind) {
        if let Err(e) = self.actions.record(kind, self.clock.now()).await {
            warn!(action = %kind, error = %e, "Failed to record action");
        }
    }

    async fn authorize(&self, key: Option<&str>) -> RateResult<()> {
        let key = key.unwrap_or_default();
        if self.access.verify(key).await? {
            Ok(())
        } else {
            debug!("Rejected API key");
            Err(RateError::auth("access.verify", "invalid API key"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentQuery {
    #[serde(default)]
    base: String,
    #[serde(default)]
    symbol: String,
    apikey: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoricalQuery {
    #[serde(default)]
    date: String,
    apikey: Option<String>,
}

/// Body of `GET /api/rate/current`.
#[derive(Debug, Serialize)]
pub struct CurrentRateResponse {
    pub base: String,
    pub rate: BTreeMap<String, f64>,
}

/// Rates of one base on a date.
#[derive(Debug, Serialize)]
pub struct BaseRates {
    pub base: String,
    pub data: BTreeMap<String, f64>,
}

/// Body of `GET /api/rate/historical`.
#[derive(Debug, Serialize)]
pub struct HistoricalRatesResponse {
    pub date: String,
    pub rates: Vec<BaseRates>,
}

fn rate_value(quote: &Quote) -> f64 {
    quote.rate().to_f64().unwrap_or_default()
}

/// Group quotes by base, bases in catalog order.
fn group_by_base(engine: &ReconciliationEngine, quotes: &[Quote]) -> Vec<BaseRates> {
    engine
        .catalog()
        .pairs()
        .filter_map(|(base, _)| {
            let data: BTreeMap<String, f64> = quotes
                .iter()
                .filter(|quote| quote.base() == base)
                .map(|quote| (quote.target().to_string(), rate_value(quote)))
                .collect();

            (!data.is_empty()).then(|| BaseRates {
                base: base.to_string(),
                data,
            })
        })
        .collect()
}

async fn current_rate(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CurrentQuery>,
) -> ApiResult<Json<CurrentRateResponse>> {
    state.record(ActionKind::Pair).await;
    state.authorize(q.apikey.as_deref()).await?;

    let quote = state.engine.get_current(&q.base, &q.symbol).await?;

    Ok(Json(CurrentRateResponse {
        base: quote.base().to_string(),
        rate: BTreeMap::from([(quote.target().to_string(), rate_value(&quote))]),
    }))
}

async fn historical_rates(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoricalQuery>,
) -> ApiResult<Json<HistoricalRatesResponse>> {
    state.record(ActionKind::Date).await;
    state.authorize(q.apikey.as_deref()).await?;

    let quotes = state.engine.get_for_date(&q.date).await?;

    Ok(Json(HistoricalRatesResponse {
        date: q.date.trim().to_string(),
        rates: group_by_base(&state.engine, &quotes),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/rate/current", get(current_rate))
        .route("/api/rate/historical", get(historical_rates))
        .with_state(state)
}
