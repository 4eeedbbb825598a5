//! Market Records
//!
//! A `MarketRecord` is one OHLC update for one instrument and one interval,
//! flattened out of a decoded feed frame. Records are immutable once built
//! and are consumed exactly once by the dispatcher that drains them.

use serde::{Deserialize, Serialize};

/// One decoded feed update.
///
/// Only the routing identifiers (`feed_id`, `interval`, `timestamp_ms`) are
/// mandatory; every numeric field may be absent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Upstream instrument key, e.g. `NSE_EQ|INE047A01021`.
    pub feed_id: String,
    /// Interval label, e.g. `I1`, `I30`, `1d`.
    pub interval: String,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume.
    pub volume: Option<i64>,
    /// Interval timestamp, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl MarketRecord {
    /// Create a record with no numeric fields set.
    #[must_use]
    pub fn new(feed_id: impl Into<String>, interval: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            feed_id: feed_id.into(),
            interval: interval.into(),
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            timestamp_ms,
        }
    }

    /// Set all four prices.
    #[must_use]
    pub const fn with_ohlc(mut self, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.close = Some(close);
        self
    }

    /// Set the traded volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: i64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Whether at least one numeric field is present. NaN and infinite
    /// prices count as absent.
    #[must_use]
    pub fn has_fields(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .into_iter()
            .any(|price| price.is_some_and(f64::is_finite))
            || self.volume.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let record = MarketRecord::new("NSE_EQ|X", "I1", 1_757_580_360_000)
            .with_ohlc(1.0, 2.0, 0.5, 1.5)
            .with_volume(42);

        assert_eq!(record.open, Some(1.0));
        assert_eq!(record.close, Some(1.5));
        assert_eq!(record.volume, Some(42));
        assert!(record.has_fields());
    }

    #[test]
    fn bare_record_has_no_fields() {
        let record = MarketRecord::new("NSE_EQ|X", "1d", 0);
        assert!(!record.has_fields());
    }

    #[test]
    fn non_finite_prices_are_not_fields() {
        let mut record = MarketRecord::new("NSE_EQ|X", "I1", 0);
        record.open = Some(f64::NAN);
        record.high = Some(f64::INFINITY);
        record.low = Some(f64::NEG_INFINITY);
        assert!(!record.has_fields());

        record.close = Some(1.5);
        assert!(record.has_fields());
    }
}
