//! exrate storage
//!
//! Postgres adapters for the quote cache, API keys and the action log, plus
//! in-memory stand-ins used when no database is configured.

pub mod access;
pub mod audit;
pub mod rates;
pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use exrate_common::{RateError, RateResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

pub use access::{sha256_hex, AccessGate, MemoryAccessGate, PgAccessGate};
pub use audit::{ActionKind, ActionLog, MemoryActionLog, PgActionLog};
pub use rates::PgRateCache;
pub use schema::initialize_schema;
pub use sqlx::postgres::PgConnectOptions;

/// Pool sizing and startup retry policy.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long one attempt may wait for a connection.
    pub acquire_timeout: Duration,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
            connect_attempts: 10,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Parse a `postgres://` URL.
pub fn parse_url(url: &str) -> RateResult<PgConnectOptions> {
    PgConnectOptions::from_str(url).map_err(|e| RateError::validation("db.parse_url", e.to_string()))
}

/// Open a connection pool, retrying while the database is unreachable.
pub async fn connect(options: PgConnectOptions, settings: &PoolSettings) -> RateResult<PgPool> {
    let attempts = settings.connect_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options.clone())
            .await;

        match result {
            Ok(pool) => {
                info!(
                    host = options.get_host(),
                    max_connections = settings.max_connections,
                    attempt,
                    "Connected to Postgres"
                );
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    attempt,
                    attempts,
                    error = %e,
                    "Postgres not reachable, retrying in {:?}",
                    settings.retry_delay
                );
                tokio::time::sleep(settings.retry_delay).await;
                attempt += 1;
            }
            Err(e) => return Err(RateError::storage("db.connect", e)),
        }
    }
}

/// Pool on the database named by `DATABASE_URL`, schema in place.
#[cfg(test)]
pub(crate) async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let settings = PoolSettings {
        max_connections: 2,
        connect_attempts: 1,
        ..PoolSettings::default()
    };
    let pool = connect(parse_url(&url).unwrap(), &settings).await.unwrap();
    initialize_schema(&pool).await.unwrap();
    pool
}
