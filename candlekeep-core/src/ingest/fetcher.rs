//! Batch fetcher: one paced, retried page request per call.
//!
//! Transient provider errors are retried on the same cursor after a fixed
//! cooldown, up to `max_retries` times; anything else is fatal at once. The
//! bar at the cursor (already stored, or the requested start) is stripped so
//! callers only ever see strictly newer bars.

use crate::config::IngestConfig;
use crate::data::{MarketDataProvider, ProviderError};
use crate::domain::{format_millis, Candle, Timeframe};
use crate::error::IngestError;
use crate::ingest::pacer::{Pacer, Pause};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// Result of one successful page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Non-empty, strictly increasing, all after the cursor.
    Candles(Vec<Candle>),
    /// The page held nothing newer than the cursor.
    NoNewData,
}

pub struct BatchFetcher<'a> {
    provider: &'a dyn MarketDataProvider,
    pacer: &'a dyn Pacer,
    config: &'a IngestConfig,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider, pacer: &'a dyn Pacer, config: &'a IngestConfig) -> Self {
        Self {
            provider,
            pacer,
            config,
        }
    }

    pub fn provider(&self) -> &dyn MarketDataProvider {
        self.provider
    }

    /// Fetch the bars that follow `cursor`.
    pub fn fetch(&self, symbol: &str, timeframe: &Timeframe, cursor: i64) -> Result<FetchOutcome, IngestError> {
        let page = self.with_retry("fetch_page", || {
            self.provider.fetch_page(symbol, timeframe, cursor)
        })?;
        let fetched = page.len();
        let outcome = strip_seen(page, cursor);
        let fresh = match &outcome {
            FetchOutcome::Candles(c) => c.len(),
            FetchOutcome::NoNewData => 0,
        };
        debug!(cursor = %format_millis(cursor), fetched, fresh, "fetched page");
        Ok(outcome)
    }

    /// The provider's clock, through the same pacing and retry path.
    pub fn provider_time(&self) -> Result<i64, IngestError> {
        self.with_retry("now_millis", || self.provider.now_millis())
    }

    /// The provider's symbol list, through the same pacing and retry path.
    pub fn symbols(&self) -> Result<BTreeSet<String>, IngestError> {
        self.with_retry("list_symbols", || self.provider.list_symbols())
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, IngestError> {
        let retry = self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            if !self.config.request_delay.is_zero() {
                self.pacer.pause(self.config.request_delay, Pause::RateLimit)?;
            }
            attempt += 1;

            let err = match call() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                error!(operation, error = %err, "provider rejected the request");
                return Err(IngestError::Provider(err));
            }
            if attempt > retry.max_retries {
                error!(operation, attempts = attempt, error = %err, "giving up after retries");
                return Err(IngestError::RetriesExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                operation,
                attempt,
                max_retries = retry.max_retries,
                cooldown_secs = retry.cooldown.as_secs_f64(),
                error = %err,
                "could not reach provider (timeout, rate limit or exchange error); retrying"
            );
            self.pacer.pause(retry.cooldown, Pause::Cooldown)?;
        }
    }
}

/// Drop bars at or before `cursor`, then order and de-duplicate the rest.
pub fn strip_seen(page: Vec<Candle>, cursor: i64) -> FetchOutcome {
    let mut fresh: Vec<Candle> = page.into_iter().filter(|c| c.timestamp > cursor).collect();
    fresh.sort_by_key(|c| c.timestamp);
    fresh.dedup_by_key(|c| c.timestamp);
    if fresh.is_empty() {
        FetchOutcome::NoNewData
    } else {
        FetchOutcome::Candles(fresh)
    }
}
