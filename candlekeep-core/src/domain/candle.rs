//! Candle — the fundamental market data unit.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar, keyed by its open time.
///
/// Prices and volume are kept as the decimal strings the provider sent, so
/// nothing is lost to floating-point rounding between the wire and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, milliseconds since the Unix epoch (UTC).
    pub timestamp: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl Candle {
    /// Open time rendered as RFC 3339, e.g. `2024-01-05T00:00:00.000Z`.
    pub fn iso8601(&self) -> String {
        format_millis(self.timestamp)
    }
}

/// Render a millisecond timestamp as RFC 3339 (UTC), or the raw number when it
/// falls outside chrono's range.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}
