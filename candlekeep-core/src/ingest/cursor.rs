//! Starting cursor resolution.
//!
//! Priority: an explicit start time, then the newest stored bar, then the
//! configured default epoch. Only reads from the store.

use crate::domain::format_millis;
use crate::error::{ConfigError, IngestError};
use crate::store::OrderedStore;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::info;

/// Where the starting cursor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorSource {
    Explicit,
    Store,
    DefaultEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCursor {
    pub cursor: i64,
    pub source: CursorSource,
}

/// Parse an ISO 8601 instant into epoch milliseconds.
///
/// Accepts RFC 3339 with an offset, naive date-times (taken as UTC) and bare
/// dates (midnight UTC).
pub fn parse_iso8601(input: &str) -> Option<i64> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Compute the cursor a run starts from.
pub fn resolve_cursor(
    explicit_start: Option<&str>,
    store: &dyn OrderedStore,
    default_since: i64,
) -> Result<ResolvedCursor, IngestError> {
    if let Some(raw) = explicit_start {
        let cursor = parse_iso8601(raw).ok_or_else(|| ConfigError::InvalidStartTime {
            value: raw.to_string(),
        })?;
        return Ok(ResolvedCursor {
            cursor,
            source: CursorSource::Explicit,
        });
    }

    if let Some(latest) = store.latest_timestamp()? {
        info!(cursor = %format_millis(latest), "resuming from last stored candle");
        return Ok(ResolvedCursor {
            cursor: latest,
            source: CursorSource::Store,
        });
    }

    info!(
        cursor = %format_millis(default_since),
        "store is empty and no start time was given; starting from the default epoch"
    );
    Ok(ResolvedCursor {
        cursor: default_since,
        source: CursorSource::DefaultEpoch,
    })
}
