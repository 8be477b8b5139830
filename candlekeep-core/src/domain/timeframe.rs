//! Timeframe — bar interval codes and calendar-aware interval arithmetic.
//!
//! A timeframe code is `<count><unit>` with unit one of `s m h d w M y`
//! (`1m` is one minute, `1M` is one month). Second through week are fixed
//! lengths; month and year step through the calendar, so "one month before
//! March 1st" is February 1st regardless of how many days February has.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unit component of a timeframe code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            's' => Some(Self::Second),
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'M' => Some(Self::Month),
            'y' => Some(Self::Year),
            _ => None,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Self::Second => 's',
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'M',
            Self::Year => 'y',
        }
    }

    /// Length in seconds for units that have a fixed length.
    fn fixed_seconds(self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(3_600),
            Self::Day => Some(86_400),
            Self::Week => Some(604_800),
            Self::Month | Self::Year => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("invalid timeframe '{code}': {reason}")]
    InvalidTimeframe { code: String, reason: String },
}

impl TimeframeError {
    fn invalid(code: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTimeframe {
            code: code.to_string(),
            reason: reason.into(),
        }
    }
}

/// Immutable bar interval, e.g. 4 hours or 1 month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    count: u32,
    unit: TimeUnit,
}

impl Timeframe {
    /// Parse a code such as `15m`, `4h`, `1d`, `1M`.
    pub fn parse(code: &str) -> Result<Self, TimeframeError> {
        let trimmed = code.trim();
        let mut chars = trimmed.chars();
        let suffix = chars
            .next_back()
            .ok_or_else(|| TimeframeError::invalid(code, "empty code"))?;
        let digits = chars.as_str();

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(TimeframeError::invalid(
                code,
                "expected <integer><unit>, e.g. 1d or 15m",
            ));
        }
        let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| {
            TimeframeError::invalid(code, format!("unknown unit '{suffix}' (use s, m, h, d, w, M, y)"))
        })?;
        let count: u32 = digits
            .parse()
            .map_err(|_| TimeframeError::invalid(code, "count out of range"))?;
        if count == 0 {
            return Err(TimeframeError::invalid(code, "count must be at least 1"));
        }
        Ok(Self { count, unit })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Canonical textual code (`parse(code()) == self`).
    pub fn code(&self) -> String {
        format!("{}{}", self.count, self.unit.suffix())
    }

    fn calendar_months(&self) -> Option<u32> {
        match self.unit {
            TimeUnit::Month => Some(self.count),
            TimeUnit::Year => self.count.checked_mul(12),
            _ => None,
        }
    }

    fn fixed_delta(&self) -> Option<Duration> {
        self.unit
            .fixed_seconds()
            .map(|secs| Duration::seconds(secs * i64::from(self.count)))
    }

    /// `instant` minus one interval.
    pub fn back_from(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.calendar_months() {
            Some(months) => instant.checked_sub_months(Months::new(months)),
            None => instant.checked_sub_signed(self.fixed_delta()?),
        }
    }

    /// `instant` plus one interval.
    pub fn forward_from(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.calendar_months() {
            Some(months) => instant.checked_add_months(Months::new(months)),
            None => instant.checked_add_signed(self.fixed_delta()?),
        }
    }

    /// Millisecond variant of [`Timeframe::back_from`].
    pub fn back_from_millis(&self, millis: i64) -> Option<i64> {
        let instant = DateTime::<Utc>::from_timestamp_millis(millis)?;
        self.back_from(instant).map(|t| t.timestamp_millis())
    }

    /// Millisecond variant of [`Timeframe::forward_from`].
    pub fn forward_from_millis(&self, millis: i64) -> Option<i64> {
        let instant = DateTime::<Utc>::from_timestamp_millis(millis)?;
        self.forward_from(instant).map(|t| t.timestamp_millis())
    }

    /// Wall-clock length of the interval that starts at `millis`.
    ///
    /// Month and year intervals differ in length depending on where they start.
    pub fn span_from_millis(&self, millis: i64) -> std::time::Duration {
        self.forward_from_millis(millis)
            .map(|end| end.saturating_sub(millis))
            .and_then(|ms| u64::try_from(ms).ok())
            .map(std::time::Duration::from_millis)
            .unwrap_or(std::time::Duration::ZERO)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.code()
    }
}
