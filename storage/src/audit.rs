//! Request action log.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exrate_common::{RateError, RateResult};
use parking_lot::Mutex;
use sqlx::PgPool;

/// Kind of request being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Current rate for one pair.
    Pair,
    /// All rates for a date.
    Date,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Pair => "PAIR",
            ActionKind::Date => "DATE",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of handled requests.
#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn record(&self, kind: ActionKind, at: DateTime<Utc>) -> RateResult<()>;
}

/// Action log kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryActionLog {
    entries: Mutex<Vec<(ActionKind, DateTime<Utc>)>>,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded entry, oldest first.
    pub fn entries(&self) -> Vec<(ActionKind, DateTime<Utc>)> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl ActionLog for MemoryActionLog {
    async fn record(&self, kind: ActionKind, at: DateTime<Utc>) -> RateResult<()> {
        self.entries.lock().push((kind, at));
        Ok(())
    }
}

/// Action log stored in the `exchange_rates_log` table.
#[derive(Debug, Clone)]
pub struct PgActionLog {
    pool: PgPool,
}

impl PgActionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionLog for PgActionLog {
    async fn record(&self, kind: ActionKind, at: DateTime<Utc>) -> RateResult<()> {
        sqlx::query("INSERT INTO exchange_rates_log (action_name, updated_at) VALUES ($1, $2)")
            .bind(kind.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| RateError::storage("audit.record", e))?;
        Ok(())
    }
}
