//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over exchanges so the ingestion loop
//! never sees a wire protocol, and so tests can drive it with a simulated
//! exchange.

use crate::domain::{Candle, Timeframe};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Structured error types for provider operations.
///
/// Every variant is either transient (worth retrying after a cooldown) or
/// final; see [`ProviderError::is_transient`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("malformed response: {0}")]
    ResponseMalformed(String),

    #[error("exchange unavailable (HTTP {status})")]
    ExchangeUnavailable { status: u16 },

    #[error("symbol not recognised by the exchange: {symbol}")]
    BadSymbol { symbol: String },

    #[error("timeframe not offered by the exchange: {timeframe}")]
    UnsupportedTimeframe { timeframe: String },

    #[error("request rejected by the exchange: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Whether retrying the same request later can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable(_)
                | Self::RateLimited { .. }
                | Self::ResponseMalformed(_)
                | Self::ExchangeUnavailable { .. }
        )
    }
}

/// How a provider serves OHLCV history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OhlcvSupport {
    /// Served directly by the exchange.
    Native,
    /// Rebuilt from trades by the client; not suitable for ingestion.
    Emulated,
    Unsupported,
}

/// Trait for market data providers (Binance, simulated exchanges in tests).
///
/// Paging contract: `fetch_page(symbol, tf, since)` returns bars in ascending
/// open-time order starting with the bar that opens at `since` when it exists.
pub trait MarketDataProvider: Send + Sync {
    /// Exchange identifier, e.g. `binance`.
    fn name(&self) -> &str;

    /// Fetch one page of bars opening at or after `since_millis`.
    fn fetch_page(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since_millis: i64,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// The exchange's current time in milliseconds.
    fn now_millis(&self) -> Result<i64, ProviderError>;

    fn ohlcv_support(&self) -> OhlcvSupport;

    /// Timeframe codes the exchange offers, in display order.
    fn timeframes(&self) -> Vec<String>;

    fn supports_timeframe(&self, code: &str) -> bool {
        self.timeframes().iter().any(|tf| tf == code)
    }

    /// Unified symbols tradable on the exchange (e.g. `BTC/USDT`).
    fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError>;

    /// Minimum spacing between requests advertised by the exchange.
    fn rate_limit(&self) -> Duration;
}
