//! Shared fixtures: a simulated daily-bar exchange and a pacer that moves its clock.
//!
//! Nothing here sleeps. Every wait the loop asks for advances the shared
//! [`SimClock`] instead, so a test can reason about provider time exactly.
#![allow(dead_code)]

use candlekeep_core::config::{IngestConfig, RetryPolicy, RunMode};
use candlekeep_core::data::{MarketDataProvider, OhlcvSupport, ProviderError};
use candlekeep_core::domain::{Candle, Timeframe};
use candlekeep_core::ingest::{IngestReport, IngestionLoop, Interrupted, Pacer, Pause};
use candlekeep_core::store::OrderedStore;
use candlekeep_core::IngestError;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DAY: i64 = 86_400_000;
pub const SYMBOL: &str = "BTC/USDT";

pub fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap().timestamp_millis()
}

pub fn day(y: i32, m: u32, d: u32) -> i64 {
    at(y, m, d, 0, 0, 0)
}

pub fn daily() -> Timeframe {
    Timeframe::parse("1d").unwrap()
}

/// Provider time, shared by the exchange and the pacer.
#[derive(Debug)]
pub struct SimClock(Mutex<i64>);

impl SimClock {
    pub fn starting_at(millis: i64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(millis)))
    }

    pub fn now(&self) -> i64 {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, millis: i64) {
        *self.0.lock().unwrap() = millis;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by.as_millis() as i64;
    }
}

/// Exchange listing one daily bar per day from `first_bar`, including the
/// bar that is still forming at the current clock.
pub struct SimExchange {
    clock: Arc<SimClock>,
    first_bar: i64,
    page_limit: usize,
    support: OhlcvSupport,
    failing: bool,
    outage_until: Option<i64>,
    calls: Mutex<Vec<i64>>,
}

impl SimExchange {
    pub fn daily(clock: Arc<SimClock>, first_bar: i64) -> Self {
        Self {
            clock,
            first_bar,
            page_limit: 3,
            support: OhlcvSupport::Native,
            failing: false,
            outage_until: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_support(mut self, support: OhlcvSupport) -> Self {
        self.support = support;
        self
    }

    /// Every page request fails as an unreachable network would.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Pages come back empty, although bars exist, until the clock reaches `until`.
    pub fn with_outage_until(mut self, until: i64) -> Self {
        self.outage_until = Some(until);
        self
    }

    /// `since` of every page request, in order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bar(&self, timestamp: i64) -> Candle {
        let n = (timestamp - self.first_bar) / DAY;
        Candle {
            timestamp,
            open: format!("{}.0", 100 + n),
            high: format!("{}.5", 101 + n),
            low: format!("{}.5", 99 + n),
            close: format!("{}.0", 101 + n),
            volume: format!("{}", 10 * (n + 1)),
        }
    }
}

impl MarketDataProvider for SimExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    fn fetch_page(&self, symbol: &str, timeframe: &Timeframe, since: i64) -> Result<Vec<Candle>, ProviderError> {
        self.calls.lock().unwrap().push(since);
        if self.failing {
            return Err(ProviderError::NetworkUnreachable("connection reset".into()));
        }
        if symbol != SYMBOL {
            return Err(ProviderError::BadSymbol {
                symbol: symbol.to_string(),
            });
        }
        if timeframe.code() != "1d" {
            return Err(ProviderError::UnsupportedTimeframe {
                timeframe: timeframe.code(),
            });
        }

        let now = self.clock.now();
        if self.outage_until.is_some_and(|until| now < until) {
            return Ok(Vec::new());
        }
        let skip = if since <= self.first_bar {
            0
        } else {
            (since - self.first_bar + DAY - 1) / DAY
        };
        Ok((skip..)
            .map(|k| self.first_bar + k * DAY)
            .take_while(|ts| *ts <= now)
            .take(self.page_limit)
            .map(|ts| self.bar(ts))
            .collect())
    }

    fn now_millis(&self) -> Result<i64, ProviderError> {
        Ok(self.clock.now())
    }

    fn ohlcv_support(&self) -> OhlcvSupport {
        self.support
    }

    fn timeframes(&self) -> Vec<String> {
        vec!["1m".into(), "1h".into(), "1d".into()]
    }

    fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
        Ok([SYMBOL, "ETH/USDT"].into_iter().map(String::from).collect())
    }

    fn rate_limit(&self) -> Duration {
        Duration::from_millis(50)
    }
}

/// Pacer that records every wait and advances the clock by it.
pub struct SimPacer {
    clock: Arc<SimClock>,
    pauses: Mutex<Vec<(Duration, Pause)>>,
    idle_budget: Option<usize>,
    interrupted: AtomicBool,
}

impl SimPacer {
    pub fn new(clock: Arc<SimClock>) -> Self {
        Self {
            clock,
            pauses: Mutex::new(Vec::new()),
            idle_budget: None,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Let `n` idle waits complete; the next one is interrupted.
    pub fn interrupt_after_idle(mut self, n: usize) -> Self {
        self.idle_budget = Some(n);
        self
    }

    /// Already interrupted before the run starts.
    pub fn interrupted(clock: Arc<SimClock>) -> Self {
        let pacer = Self::new(clock);
        pacer.interrupted.store(true, Ordering::SeqCst);
        pacer
    }

    pub fn waits(&self, reason: Pause) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| *r == reason)
            .map(|(d, _)| *d)
            .collect()
    }
}

impl Pacer for SimPacer {
    fn pause(&self, duration: Duration, reason: Pause) -> Result<(), Interrupted> {
        if self.is_interrupted() {
            return Err(Interrupted);
        }
        let idle_so_far = {
            let mut pauses = self.pauses.lock().unwrap();
            pauses.push((duration, reason));
            pauses.iter().filter(|(_, r)| *r == Pause::Idle).count()
        };
        if reason == Pause::Idle && self.idle_budget.is_some_and(|n| idle_so_far > n) {
            self.interrupted.store(true, Ordering::SeqCst);
            return Err(Interrupted);
        }
        self.clock.advance(duration);
        Ok(())
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Run configuration for a store that should start at 2024-01-01.
pub fn config(mode: RunMode) -> IngestConfig {
    IngestConfig::new(mode)
        .with_default_since(day(2023, 12, 31))
        .with_retry(RetryPolicy {
            max_retries: 3,
            cooldown: Duration::from_secs(300),
        })
}

pub fn run(
    exchange: &SimExchange,
    store: &mut dyn OrderedStore,
    pacer: &SimPacer,
    config: &IngestConfig,
    start: Option<&str>,
) -> Result<IngestReport, IngestError> {
    IngestionLoop::new(exchange, store, pacer, config, SYMBOL, daily()).run(start)
}

pub fn stored_timestamps(store: &dyn OrderedStore) -> Vec<i64> {
    store.scan().unwrap().into_iter().map(|c| c.timestamp).collect()
}
