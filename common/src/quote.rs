//! Quotes and their cache identity.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::currency::{Currency, CurrencyPair};

/// Rejected attempt to build a quote with a rate that is not strictly positive.
#[derive(Debug, Clone, Error)]
#[error("rate for {pair} must be positive, got {rate}")]
pub struct NonPositiveRate {
    pub pair: CurrencyPair,
    pub rate: Decimal,
}

/// A (base, target, rate, date) record.
///
/// The rate is always strictly positive; construction enforces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    base: Currency,
    target: Currency,
    rate: Decimal,
    date: NaiveDate,
    fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote for `date`, stamped with the current time.
    pub fn new(
        base: Currency,
        target: Currency,
        rate: Decimal,
        date: NaiveDate,
    ) -> Result<Self, NonPositiveRate> {
        if rate <= Decimal::ZERO {
            return Err(NonPositiveRate {
                pair: CurrencyPair::new(base, target),
                rate,
            });
        }

        Ok(Self {
            base,
            target,
            rate,
            date,
            fetched_at: Utc::now(),
        })
    }

    /// Move the quote to another day.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Override the fetch timestamp.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn target(&self) -> &Currency {
        &self.target
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Day the quote applies to.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// When the quote was obtained from the provider.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.target.clone())
    }

    /// Cache identity of this quote.
    pub fn key(&self) -> QuoteKey {
        QuoteKey::new(self.base.clone(), self.target.clone(), self.date)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}={} @ {}",
            self.base, self.target, self.rate, self.date
        )
    }
}

/// Identity of a stored quote: at most one quote exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuoteKey {
    pub base: Currency,
    pub target: Currency,
    pub date: NaiveDate,
}

impl QuoteKey {
    pub fn new(base: Currency, target: Currency, date: NaiveDate) -> Self {
        Self { base, target, date }
    }
}

impl fmt::Display for QuoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.base, self.target, self.date)
    }
}
