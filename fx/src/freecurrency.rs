//! HTTP provider backed by freecurrencyapi.com.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use exrate_common::time::format_date;
use exrate_common::{Clock, Currency, Quote, RateError, RateResult, SystemClock};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::RateProvider;

/// Public freecurrencyapi.com host.
pub const DEFAULT_BASE_URL: &str = "https://api.freecurrencyapi.com";

const LATEST_PATH: &str = "/v1/latest";

/// Configuration for [`FreeCurrencyProvider`].
#[derive(Debug, Clone)]
pub struct FreeCurrencyConfig {
    /// Host to send requests to, without a trailing path.
    pub base_url: String,
    /// API key passed as the `apikey` query parameter.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl FreeCurrencyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    data: HashMap<String, Option<f64>>,
}

/// Quote provider calling the freecurrencyapi `latest` endpoint.
///
/// The upstream answers missing pairs with a zero or null rate. Those are
/// reported as [`ProviderError::NoData`] so no zero ever reaches the cache.
pub struct FreeCurrencyProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    clock: Arc<dyn Clock>,
}

impl FreeCurrencyProvider {
    /// Create a new provider.
    pub fn new(config: FreeCurrencyConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("exrate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), LATEST_PATH),
            api_key: config.api_key,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` to date quotes returned by `fetch_latest`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn request(
        &self,
        base: &Currency,
        targets: &[Currency],
        date: Option<NaiveDate>,
    ) -> ProviderResult<HashMap<String, Option<f64>>> {
        let currencies = targets
            .iter()
            .map(Currency::code)
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![
            ("apikey", self.api_key.clone()),
            ("base_currency", base.code().to_string()),
            ("currencies", currencies),
        ];
        if let Some(date) = date {
            params.push(("date", format_date(date)));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(base = %base, "Provider request timed out");
                }
                ProviderError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: LatestResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(parsed.data)
    }

    fn to_quotes(
        base: &Currency,
        targets: &[Currency],
        date: NaiveDate,
        data: &HashMap<String, Option<f64>>,
    ) -> ProviderResult<Vec<Quote>> {
        targets
            .iter()
            .map(|target| -> ProviderResult<Quote> {
                let rate = data
                    .get(target.code())
                    .copied()
                    .flatten()
                    .filter(|rate| *rate > 0.0)
                    .and_then(Decimal::from_f64)
                    .ok_or_else(|| ProviderError::NoData {
                        base: base.to_string(),
                        target: target.to_string(),
                    })?;

                Ok(Quote::new(base.clone(), target.clone(), rate, date)?)
            })
            .collect()
    }
}

#[async_trait]
impl RateProvider for FreeCurrencyProvider {
    fn name(&self) -> &str {
        "freecurrencyapi"
    }

    #[instrument(skip_all, fields(base = %base, target = %target))]
    async fn fetch_latest(&self, base: &Currency, target: &Currency) -> RateResult<Quote> {
        const OP: &str = "provider.fetch_latest";

        let targets = std::slice::from_ref(target);
        let data = self
            .request(base, targets, None)
            .await
            .map_err(|e| RateError::provider(OP, e))?;

        let quote = Self::to_quotes(base, targets, self.clock.today(), &data)
            .map_err(|e| RateError::provider(OP, e))?
            .pop()
            .ok_or_else(|| {
                RateError::provider(
                    OP,
                    ProviderError::NoData {
                        base: base.to_string(),
                        target: target.to_string(),
                    },
                )
            })?;

        debug!(rate = %quote.rate(), "Fetched latest rate");
        Ok(quote)
    }

    #[instrument(skip_all, fields(base = %base, date = %date))]
    async fn fetch_for_date(
        &self,
        base: &Currency,
        targets: &[Currency],
        date: NaiveDate,
    ) -> RateResult<Vec<Quote>> {
        const OP: &str = "provider.fetch_for_date";

        let data = self
            .request(base, targets, Some(date))
            .await
            .map_err(|e| RateError::provider(OP, e))?;

        let quotes =
            Self::to_quotes(base, targets, date, &data).map_err(|e| RateError::provider(OP, e))?;

        debug!(count = quotes.len(), "Fetched rates for date");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exrate_common::{CurrencyCatalog, ErrorKind, FixedClock};
    use std::error::Error as _;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
    }

    fn provider(server: &MockServer) -> FreeCurrencyProvider {
        let mut config = FreeCurrencyConfig::new("test-key");
        config.base_url = server.uri();
        FreeCurrencyProvider::new(config)
            .unwrap()
            .with_clock(Arc::new(FixedClock::at_date(day())))
    }

    #[tokio::test]
    async fn test_fetch_latest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("apikey", "test-key"))
            .and(query_param("base_currency", "USD"))
            .and(query_param("currencies", "EUR"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"data":{"EUR":0.92}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let eur = catalog.validate("EUR").unwrap();

        let quote = provider(&server).fetch_latest(&usd, &eur).await.unwrap();
        assert_eq!(quote.rate(), Decimal::new(92, 2));
        assert_eq!(quote.date(), day());
    }

    #[tokio::test]
    async fn test_fetch_for_date_sends_all_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("base_currency", "USD"))
            .and(query_param("currencies", "RUB,EUR,JPY"))
            .and(query_param("date", "2025-07-21"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":{"RUB":78.5,"EUR":0.85,"JPY":147.2}}"#,
            ))
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let targets = catalog.targets_of(&usd).unwrap().to_vec();

        let quotes = provider(&server)
            .fetch_for_date(&usd, &targets, day())
            .await
            .unwrap();

        let codes: Vec<&str> = quotes.iter().map(|q| q.target().code()).collect();
        assert_eq!(codes, vec!["RUB", "EUR", "JPY"]);
        assert!(quotes.iter().all(|q| q.date() == day()));
    }

    #[tokio::test]
    async fn test_zero_rate_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data":{"RUB":78.5,"EUR":0,"JPY":null}}"#),
            )
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let targets = catalog.targets_of(&usd).unwrap().to_vec();

        let err = provider(&server)
            .fetch_for_date(&usd, &targets, day())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.source().unwrap().to_string(), "no rate for USD/EUR");
    }

    #[tokio::test]
    async fn test_missing_target_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let jpy = catalog.validate("JPY").unwrap();

        let err = provider(&server).fetch_latest(&usd, &jpy).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.operation(), "provider.fetch_latest");
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let eur = catalog.validate("EUR").unwrap();

        let err = provider(&server).fetch_latest(&usd, &eur).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.source().unwrap().to_string(), "HTTP 500: boom");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let catalog = CurrencyCatalog::standard();
        let usd = catalog.validate("USD").unwrap();
        let eur = catalog.validate("EUR").unwrap();

        let err = provider(&server).fetch_latest(&usd, &eur).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err
            .source()
            .unwrap()
            .to_string()
            .starts_with("malformed response"));
    }
}
