//! The fixed universe of tracked currency pairs.

use std::collections::HashSet;

use crate::currency::{normalize_code, Currency, CurrencyPair};
use crate::error::{RateError, RateResult};

/// Targets tracked for one base currency, in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub base: Currency,
    pub targets: Vec<Currency>,
}

/// Immutable registry of valid currency codes and tracked pairs.
///
/// Built once at startup and shared read-only. Bases keep their configured
/// order, which is also the order full-date reconciliation walks them in.
#[derive(Debug, Clone)]
pub struct CurrencyCatalog {
    entries: Vec<CatalogEntry>,
    known: HashSet<String>,
}

impl CurrencyCatalog {
    /// Build a catalog from a base -> targets table.
    ///
    /// Codes are normalised the same way [`validate`](Self::validate) does.
    /// Duplicate targets are dropped, keeping the first occurrence.
    pub fn new<B, T, I>(table: impl IntoIterator<Item = (B, I)>) -> RateResult<Self>
    where
        B: AsRef<str>,
        T: AsRef<str>,
        I: IntoIterator<Item = T>,
    {
        const OP: &str = "catalog.new";

        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut known = HashSet::new();

        for (raw_base, raw_targets) in table {
            let base = normalize_code(raw_base.as_ref())
                .map_err(|message| RateError::validation(OP, message))?;

            if entries.iter().any(|e| e.base.code() == base) {
                return Err(RateError::validation(
                    OP,
                    format!("base currency {} listed twice", base),
                ));
            }

            let mut targets: Vec<Currency> = Vec::new();
            for raw_target in raw_targets {
                let target = normalize_code(raw_target.as_ref())
                    .map_err(|message| RateError::validation(OP, message))?;

                if target == base {
                    return Err(RateError::validation(
                        OP,
                        format!("{} cannot be quoted against itself", base),
                    ));
                }
                if targets.iter().any(|t| t.code() == target) {
                    continue;
                }

                known.insert(target.clone());
                targets.push(Currency::from_normalized(target));
            }

            if targets.is_empty() {
                return Err(RateError::validation(
                    OP,
                    format!("base currency {} has no targets", base),
                ));
            }

            known.insert(base.clone());
            entries.push(CatalogEntry {
                base: Currency::from_normalized(base),
                targets,
            });
        }

        if entries.is_empty() {
            return Err(RateError::validation(OP, "catalog has no base currencies"));
        }

        Ok(Self { entries, known })
    }

    /// Parse a catalog from `BASE:T1,T2;BASE2:T1` notation.
    pub fn parse(raw: &str) -> RateResult<Self> {
        const OP: &str = "catalog.parse";

        let mut table: Vec<(String, Vec<String>)> = Vec::new();
        for section in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (base, targets) = section.split_once(':').ok_or_else(|| {
                RateError::validation(OP, format!("expected BASE:TARGETS, got {:?}", section))
            })?;

            let targets = targets
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            table.push((base.to_string(), targets));
        }

        Self::new(table)
    }

    /// The four-currency table the service tracks by default.
    pub fn standard() -> Self {
        Self::new([
            ("USD", ["RUB", "EUR", "JPY"]),
            ("RUB", ["USD", "EUR", "JPY"]),
            ("EUR", ["RUB", "USD", "JPY"]),
            ("JPY", ["RUB", "EUR", "USD"]),
        ])
        .unwrap_or_else(|e| unreachable!("standard catalog is well formed: {e}"))
    }

    /// Validate a raw code against the catalog.
    ///
    /// Accepts exactly three letters in any case, surrounded by optional
    /// whitespace, naming a known base or target.
    pub fn validate(&self, code: &str) -> RateResult<Currency> {
        const OP: &str = "catalog.validate";

        let code = normalize_code(code).map_err(|message| RateError::validation(OP, message))?;

        if !self.known.contains(&code) {
            return Err(RateError::validation(
                OP,
                format!("unknown currency: {}", code),
            ));
        }

        Ok(Currency::from_normalized(code))
    }

    /// Base -> ordered targets, in configured base order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Currency, &[Currency])> + '_ {
        self.entries
            .iter()
            .map(|entry| (&entry.base, entry.targets.as_slice()))
    }

    /// All catalog entries.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Every tracked pair, flattened.
    pub fn all_pairs(&self) -> impl Iterator<Item = CurrencyPair> + '_ {
        self.entries.iter().flat_map(|entry| {
            entry
                .targets
                .iter()
                .map(|target| CurrencyPair::new(entry.base.clone(), target.clone()))
        })
    }

    /// Targets configured for a base.
    pub fn targets_of(&self, base: &Currency) -> Option<&[Currency]> {
        self.entries
            .iter()
            .find(|entry| &entry.base == base)
            .map(|entry| entry.targets.as_slice())
    }

    /// Number of tracked pairs.
    pub fn pair_count(&self) -> usize {
        self.entries.iter().map(|e| e.targets.len()).sum()
    }

    /// Check whether a normalised code is known.
    pub fn contains(&self, code: &str) -> bool {
        self.known.contains(code)
    }
}

impl Default for CurrencyCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
