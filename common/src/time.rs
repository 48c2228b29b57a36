//! Date handling and clocks.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::{RateError, RateResult};

/// Wire format of every date the service accepts or emits (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> RateResult<NaiveDate> {
    const OP: &str = "date.parse";

    let raw = raw.trim();
    // chrono accepts signed years and single-digit fields; the wire format does not.
    if !is_wire_shaped(raw) {
        return Err(RateError::validation(
            OP,
            format!("date must be formatted as YYYY-MM-DD, got {:?}", raw),
        ));
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        RateError::validation(OP, format!("invalid date {:?}: {}", raw, e))
    })
}

/// Four digits, dash, two digits, dash, two digits.
fn is_wire_shaped(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Pin the clock to midday of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let midday = date.and_time(NaiveTime::MIN) + Duration::hours(12);
        Self(midday.and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
