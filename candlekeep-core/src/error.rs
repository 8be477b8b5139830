//! Error taxonomy for a run: configuration, provider, storage, interruption.

use crate::data::ProviderError;
use crate::domain::TimeframeError;
use crate::ingest::pacer::Interrupted;
use crate::store::StoreError;
use thiserror::Error;

/// Problems found before ingestion starts. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidTimeframe(#[from] TimeframeError),

    #[error("could not parse start time '{value}' (expected ISO 8601, e.g. 2018-01-01T00:00:00Z)")]
    InvalidStartTime { value: String },

    #[error("exchange '{exchange}' not found; available exchanges: {}", available.join(", "))]
    UnknownExchange {
        exchange: String,
        available: Vec<String>,
    },

    #[error("{exchange} does not support fetching OHLCV data")]
    OhlcvUnsupported { exchange: String },

    #[error("{exchange} only emulates OHLCV data, which cannot be ingested")]
    OhlcvEmulated { exchange: String },

    #[error("timeframe {timeframe} is not available from {exchange}; available timeframes: {}", available.join(", "))]
    TimeframeUnavailable {
        timeframe: String,
        exchange: String,
        available: Vec<String>,
    },

    #[error("symbol {symbol} is not available from {exchange} ({} symbols listed, e.g. {})", available.len(), preview(available))]
    SymbolUnavailable {
        symbol: String,
        exchange: String,
        available: Vec<String>,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("cannot read settings file {path}: {reason}")]
    SettingsFile { path: String, reason: String },
}

fn preview(symbols: &[String]) -> String {
    const SHOWN: usize = 8;
    let mut out = symbols
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if symbols.len() > SHOWN {
        out.push_str(", ...");
    }
    out
}

/// Everything that can stop an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not fetch from the provider after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderError },

    #[error("provider error: {0}")]
    Provider(ProviderError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("interrupted")]
    Interrupted,
}

impl IngestError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

impl From<Interrupted> for IngestError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

impl From<TimeframeError> for IngestError {
    fn from(err: TimeframeError) -> Self {
        Self::Config(ConfigError::InvalidTimeframe(err))
    }
}
