//! Bar completeness: has the newest bar finished forming?
//!
//! A bar opened at `t` is complete once the provider clock reaches `t` plus
//! one interval, tested as `back_from(now) >= t` with calendar-aware
//! subtraction so month and year bars close on the right day.

use crate::domain::{Candle, Timeframe};

/// True while the bar that opened at `bar_timestamp` is still forming.
pub fn is_incomplete(bar_timestamp: i64, timeframe: &Timeframe, provider_now: i64) -> bool {
    match timeframe.back_from_millis(provider_now) {
        Some(cutoff) => cutoff < bar_timestamp,
        // Clock outside the representable range: keep the bar out of the store.
        None => true,
    }
}

/// Remove and return the trailing bar of `batch` if it is still forming.
pub fn split_open_bar(batch: &mut Vec<Candle>, timeframe: &Timeframe, provider_now: i64) -> Option<Candle> {
    match batch.last() {
        Some(last) if is_incomplete(last.timestamp, timeframe, provider_now) => batch.pop(),
        _ => None,
    }
}
