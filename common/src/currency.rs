//! Currency codes and pairs.

use serde::Serialize;
use std::fmt;

/// A 3-letter currency code known to a [`CurrencyCatalog`].
///
/// Values are only handed out by the catalog, so holding a `Currency` means
/// the code was normalised and checked against the tracked universe.
///
/// [`CurrencyCatalog`]: crate::CurrencyCatalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Wrap an already normalised code.
    pub(crate) fn from_normalized(code: String) -> Self {
        Self(code)
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Currency {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim and upper-case a raw code, rejecting anything that is not exactly
/// three ASCII letters.
pub(crate) fn normalize_code(raw: &str) -> Result<String, String> {
    let code = raw.trim().to_ascii_uppercase();

    if code.chars().count() != 3 {
        return Err(format!(
            "currency code must be exactly 3 letters, got {:?}",
            raw
        ));
    }

    if !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("currency code must be alphabetic, got {:?}", raw));
    }

    Ok(code)
}

/// A (base, target) currency pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CurrencyPair {
    /// Currency the rate is quoted from.
    pub base: Currency,
    /// Currency the rate is quoted into.
    pub target: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, target: Currency) -> Self {
        Self { base, target }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.target)
    }
}
