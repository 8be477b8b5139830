//! candlekeep core — incremental, resumable OHLCV candle ingestion.
//!
//! This crate contains:
//! - Domain types (candles, calendar-aware timeframes)
//! - The market data provider seam and a Binance implementation
//! - The ordered store seam and a SQLite implementation
//! - The ingestion engine: cursor resolution, paced/retried fetching,
//!   open-bar exclusion, idempotent persistence and the run loop
//! - Run configuration and the error taxonomy

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod store;

pub use config::{IngestConfig, RetryPolicy, RunMode, Settings};
pub use error::{ConfigError, IngestError};
