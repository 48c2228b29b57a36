//! Table bootstrap.

use exrate_common::{RateError, RateResult};
use sqlx::PgPool;
use tracing::debug;

/// Statements run at startup, in order. All are idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS exchange_rates (
        id BIGSERIAL PRIMARY KEY,
        base_currency CHAR(3) NOT NULL,
        target_currency CHAR(3) NOT NULL,
        rate NUMERIC NOT NULL CHECK (rate > 0),
        rate_date DATE NOT NULL,
        fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (base_currency, target_currency, rate_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id BIGSERIAL PRIMARY KEY,
        key_hash CHAR(64) NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exchange_rates_log (
        id BIGSERIAL PRIMARY KEY,
        action_name VARCHAR(16) NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Create every table the service uses if it does not exist yet.
pub async fn initialize_schema(pool: &PgPool) -> RateResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| RateError::storage("db.initialize_schema", e))?;
    }

    debug!(tables = SCHEMA.len(), "Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        assert!(SCHEMA
            .iter()
            .all(|s| s.trim_start().starts_with("CREATE TABLE IF NOT EXISTS")));
    }

    #[test]
    fn test_quote_key_is_unique() {
        assert!(SCHEMA[0].contains("UNIQUE (base_currency, target_currency, rate_date)"));
    }

    #[test]
    fn test_rate_column_keeps_full_precision() {
        assert!(SCHEMA[0].contains("rate NUMERIC NOT NULL"));
    }
}
