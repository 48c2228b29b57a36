//! Postgres-backed quote cache.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use exrate_common::{Currency, Quote, RateError, RateResult};
use exrate_fx::RateCache;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

const SELECT_QUOTE: &str = r#"
    SELECT rate, fetched_at
    FROM exchange_rates
    WHERE base_currency = $1 AND target_currency = $2 AND rate_date = $3
"#;

const UPSERT_QUOTE: &str = r#"
    INSERT INTO exchange_rates (base_currency, target_currency, rate, rate_date, fetched_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (base_currency, target_currency, rate_date)
    DO UPDATE SET rate = EXCLUDED.rate, fetched_at = EXCLUDED.fetched_at
"#;

/// Quote cache stored in the `exchange_rates` table.
#[derive(Debug, Clone)]
pub struct PgRateCache {
    pool: PgPool,
}

impl PgRateCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateCache for PgRateCache {
    #[instrument(skip_all, fields(base = %base, target = %target, date = %date))]
    async fn get(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> RateResult<Option<Quote>> {
        const OP: &str = "cache.get";

        let row: Option<(Decimal, DateTime<Utc>)> = sqlx::query_as(SELECT_QUOTE)
            .bind(base.code())
            .bind(target.code())
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RateError::storage(OP, e))?;

        let Some((rate, fetched_at)) = row else {
            return Ok(None);
        };

        let quote = Quote::new(base.clone(), target.clone(), rate, date)
            .map_err(|e| RateError::storage(OP, e))?
            .with_fetched_at(fetched_at);

        Ok(Some(quote))
    }

    #[instrument(skip_all, fields(key = %quote.key()))]
    async fn set(&self, quote: &Quote) -> RateResult<()> {
        sqlx::query(UPSERT_QUOTE)
            .bind(quote.base().code())
            .bind(quote.target().code())
            .bind(quote.rate())
            .bind(quote.date())
            .bind(quote.fetched_at())
            .execute(&self.pool)
            .await
            .map_err(|e| RateError::storage("cache.set", e))?;

        debug!(rate = %quote.rate(), "Upserted quote");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exrate_common::CurrencyCatalog;

    #[test]
    fn test_upsert_targets_quote_key() {
        assert!(UPSERT_QUOTE.contains("ON CONFLICT (base_currency, target_currency, rate_date)"));
        assert!(UPSERT_QUOTE.contains("rate = EXCLUDED.rate"));
    }

    #[tokio::test]
    #[ignore = "requires Postgres at DATABASE_URL"]
    async fn test_pg_upsert_keeps_one_row_with_latest_rate() {
        let pool = crate::test_pool().await;
        let cache = PgRateCache::new(pool.clone());
        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let jpy = catalog.validate("JPY").unwrap();
        let date = NaiveDate::from_ymd_opt(1999, 1, 4).unwrap();

        sqlx::query("DELETE FROM exchange_rates WHERE rate_date = $1")
            .bind(date)
            .execute(&pool)
            .await
            .unwrap();

        assert!(cache.get(&usd, &jpy, date).await.unwrap().is_none());

        let first = Quote::new(usd.clone(), jpy.clone(), Decimal::new(11350, 2), date).unwrap();
        // More fractional digits than a NUMERIC(20, 10) column would keep.
        let second =
            Quote::new(usd.clone(), jpy.clone(), Decimal::new(1134912345678912, 13), date).unwrap();
        cache.set(&first).await.unwrap();
        cache.set(&second).await.unwrap();

        let (rows,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM exchange_rates \
             WHERE base_currency = $1 AND target_currency = $2 AND rate_date = $3",
        )
        .bind("USD")
        .bind("JPY")
        .bind(date)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(rows, 1);

        let stored = cache.get(&usd, &jpy, date).await.unwrap().unwrap();
        assert_eq!(stored.rate(), second.rate());
        assert_eq!(stored.date(), date);
    }
}
