//! exrate common types
//!
//! Shared types used across the exrate workspace: validated currency codes,
//! the tracked currency catalog, quotes, the error taxonomy and date helpers.

pub mod catalog;
pub mod currency;
pub mod error;
pub mod quote;
pub mod time;

pub use catalog::{CatalogEntry, CurrencyCatalog};
pub use currency::{Currency, CurrencyPair};
pub use error::{BoxError, ErrorKind, RateError, RateResult};
pub use quote::{NonPositiveRate, Quote, QuoteKey};
pub use time::{Clock, FixedClock, SystemClock};
