//! Service configuration.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use exrate_common::time::parse_date;
use exrate_common::CurrencyCatalog;
use exrate_fx::freecurrency::DEFAULT_BASE_URL;
use exrate_fx::EngineConfig;
use exrate_storage::{PgConnectOptions, PoolSettings};

use crate::scheduler::Schedule;

/// Database configuration.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Postgres connection. `None` runs the service on in-memory stores.
    pub database: Option<PgConnectOptions>,
    /// Pool sizing and startup retries.
    pub pool: PoolSettings,
}

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// freecurrencyapi.com API key.
    pub api_key: String,
    /// Provider host.
    pub base_url: String,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Backfill scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Run the scheduler at all.
    pub enabled: bool,
    /// When ticks fire.
    pub schedule: Schedule,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: Schedule::default(),
        }
    }
}

/// Startup work.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    /// API key registered on start.
    pub default_api_key: Option<String>,
    /// Dates reconciled on start, in addition to today.
    pub seed_dates: Vec<NaiveDate>,
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Tracked currency pairs.
    pub catalog: CurrencyCatalog,
    /// Database configuration.
    pub storage: StorageConfig,
    /// Provider configuration.
    pub provider: ProviderConfig,
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Startup work.
    pub bootstrap: BootstrapConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8000,
            catalog: CurrencyCatalog::standard(),
            storage: StorageConfig::default(),
            provider: ProviderConfig::default(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(addr) = var("EXRATE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(port) = var("EXRATE_LISTEN_PORT") {
            config.listen_port = parse_number("EXRATE_LISTEN_PORT", &port)?;
        }

        if let Some(catalog) = var("EXRATE_CATALOG") {
            config.catalog = CurrencyCatalog::parse(&catalog)
                .map_err(|e| format!("EXRATE_CATALOG: {}", e))?;
        }

        config.storage.database = database(&var)?;
        if let Some(max) = var("EXRATE_DB_MAX_CONNECTIONS") {
            config.storage.pool.max_connections =
                parse_number("EXRATE_DB_MAX_CONNECTIONS", &max)?;
        }
        if let Some(attempts) = var("EXRATE_DB_CONNECT_ATTEMPTS") {
            config.storage.pool.connect_attempts =
                parse_number("EXRATE_DB_CONNECT_ATTEMPTS", &attempts)?;
        }
        if let Some(secs) = var("EXRATE_DB_RETRY_DELAY_SECS") {
            config.storage.pool.retry_delay =
                Duration::from_secs(parse_number("EXRATE_DB_RETRY_DELAY_SECS", &secs)?);
        }

        if let Some(key) = var("FREECURRENCY_API_KEY") {
            config.provider.api_key = key;
        }
        if let Some(url) = var("FREECURRENCY_BASE_URL") {
            config.provider.base_url = url;
        }
        if let Some(secs) = var("EXRATE_PROVIDER_TIMEOUT_SECS") {
            config.provider.timeout =
                Duration::from_secs(parse_number("EXRATE_PROVIDER_TIMEOUT_SECS", &secs)?);
        }

        if let Some(secs) = var("EXRATE_CALL_TIMEOUT_SECS") {
            config.engine.call_timeout =
                Duration::from_secs(parse_number("EXRATE_CALL_TIMEOUT_SECS", &secs)?);
        }

        if let Some(enabled) = var("EXRATE_BACKFILL_ENABLED") {
            config.scheduler.enabled = parse_bool("EXRATE_BACKFILL_ENABLED", &enabled)?;
        }
        if let Some(at) = var("EXRATE_BACKFILL_AT") {
            let at = NaiveTime::parse_from_str(&at, "%H:%M")
                .map_err(|_| format!("EXRATE_BACKFILL_AT must be HH:MM, got {:?}", at))?;
            config.scheduler.schedule = Schedule::DailyAt(at);
        }
        // A fixed interval wins over a daily time.
        if let Some(secs) = var("EXRATE_BACKFILL_EVERY_SECS") {
            config.scheduler.schedule = Schedule::Every(Duration::from_secs(parse_number(
                "EXRATE_BACKFILL_EVERY_SECS",
                &secs,
            )?));
        }

        config.bootstrap.default_api_key = var("DEFAULT_API_KEY");
        if let Some(dates) = var("EXRATE_SEED_DATES") {
            config.bootstrap.seed_dates = dates
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| parse_date(d).map_err(|e| format!("EXRATE_SEED_DATES: {}", e)))
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.provider.api_key.is_empty() {
            return Err("FREECURRENCY_API_KEY must be set".to_string());
        }

        if self.provider.timeout.is_zero() {
            return Err("Provider timeout must be positive".to_string());
        }

        if self.engine.call_timeout.is_zero() {
            return Err("Call timeout must be positive".to_string());
        }

        if let Schedule::Every(interval) = self.scheduler.schedule {
            if interval.is_zero() {
                return Err("Backfill interval must be positive".to_string());
            }
        }

        if self.storage.pool.max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        if self.storage.pool.connect_attempts == 0 {
            return Err("Database needs at least one connection attempt".to_string());
        }

        Ok(())
    }
}

/// Connection from `DATABASE_URL`, or from the `DB_*` parts.
fn database(var: &impl Fn(&str) -> Option<String>) -> Result<Option<PgConnectOptions>, String> {
    if let Some(url) = var("DATABASE_URL") {
        let options =
            exrate_storage::parse_url(&url).map_err(|e| format!("DATABASE_URL: {}", e))?;
        return Ok(Some(options));
    }

    const PARTS: [&str; 5] = ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_NAME"];
    let values: Vec<Option<String>> = PARTS.iter().map(|key| var(key)).collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing: Vec<&str> = PARTS
        .iter()
        .zip(&values)
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(format!("incomplete database settings, missing {}", missing.join(", ")));
    }

    let values: Vec<String> = values.into_iter().flatten().collect();
    let (host, port, user, password, name) =
        (&values[0], &values[1], &values[2], &values[3], &values[4]);

    // Credentials are passed as-is, never spliced into a URL.
    Ok(Some(
        PgConnectOptions::new()
            .host(host)
            .port(parse_number("DB_PORT", port)?)
            .username(user)
            .password(password)
            .database(name),
    ))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{} must be a number, got {:?}", key, raw))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{} must be true or false, got {:?}", key, raw)),
    }
}
