//! exrate rate engine
//!
//! Cache-first reconciliation of currency exchange rates against an upstream
//! quote provider.
//!
//! # Features
//!
//! - Pluggable quote cache and provider behind async traits
//! - freecurrencyapi.com HTTP provider
//! - Full-date reconciliation that fetches only what the cache lacks
//! - Single-flight coalescing of concurrent misses
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use exrate_common::CurrencyCatalog;
//! use exrate_fx::{EngineConfig, InMemoryRateCache, ReconciliationEngine};
//!
//! let engine = ReconciliationEngine::new(
//!     Arc::new(CurrencyCatalog::standard()),
//!     Arc::new(InMemoryRateCache::new()),
//!     provider,
//!     EngineConfig::default(),
//! );
//!
//! let quote = engine.get_current("USD", "EUR").await?;
//! let quotes = engine.get_for_date("2025-07-21").await?;
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod freecurrency;
pub mod inflight;
pub mod metrics;
pub mod provider;

pub use cache::{InMemoryRateCache, RateCache};
pub use engine::{EngineConfig, Reconciliation, ReconciliationEngine};
pub use error::{ProviderError, ProviderResult};
pub use freecurrency::{FreeCurrencyConfig, FreeCurrencyProvider};
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
pub use provider::RateProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
