//! Ordered candle store: one table per exchange/symbol/timeframe, keyed by open time.
//!
//! Layout: `{data_dir}/{exchange}/{SYMBOL}/{timeframe}/{exchange}_{SYMBOL}_{timeframe}.sqlite`
//! where `SYMBOL` is the unified symbol with the `/` removed (`BTC/USDT` → `BTCUSDT`).

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::domain::{Candle, Timeframe};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage faults. Duplicate keys are not faults and never show up here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open store at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("store schema error: {0}")]
    Schema(String),

    #[error("store fault: {0}")]
    Fault(String),
}

/// Outcome of appending one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub inserted: usize,
    /// Rows skipped because their timestamp was already stored.
    pub duplicates: usize,
}

/// Row count and time range of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub rows: u64,
    pub first: Option<i64>,
    pub last: Option<i64>,
}

/// Append-only candle table keyed uniquely by timestamp.
pub trait OrderedStore {
    /// Append a batch atomically. Rows whose timestamp already exists are
    /// skipped and counted; any other failure rolls the whole batch back.
    fn append(&mut self, candles: &[Candle]) -> Result<AppendReport, StoreError>;

    /// Open time of the newest stored candle.
    fn latest_timestamp(&self) -> Result<Option<i64>, StoreError>;

    fn summary(&self) -> Result<StoreSummary, StoreError>;

    /// All stored candles in ascending timestamp order.
    fn scan(&self) -> Result<Vec<Candle>, StoreError>;
}

/// Deterministic store location for an exchange/symbol/timeframe triple.
pub fn store_path(data_dir: &Path, exchange: &str, symbol: &str, timeframe: &Timeframe) -> PathBuf {
    let symbol_out = symbol.replace('/', "");
    let tf = timeframe.code();
    data_dir
        .join(exchange)
        .join(&symbol_out)
        .join(&tf)
        .join(format!("{exchange}_{symbol_out}_{tf}.sqlite"))
}
