//! Ingestion loop — the top-level state machine.
//!
//! ```text
//!            fetch → trim open bar → persist → advance cursor
//!          ┌──────────────────────────────────────────────┐
//!          ▼                                              │
//!     BACKFILLING ── nothing complete after cursor ──► CAUGHT_UP
//!          ▲                                              │
//!          └──── continuous: idle until next close ───────┤
//!                                                         │ one-shot
//!                                                         ▼
//!                                                     TERMINATED
//! ```
//!
//! The cursor only moves after the store has committed a batch, and only
//! forward. While behind, the only waits are the fetcher's rate-limit pauses.

use crate::config::{IngestConfig, RunMode};
use crate::data::MarketDataProvider;
use crate::domain::{format_millis, Timeframe};
use crate::error::IngestError;
use crate::ingest::completeness::{is_incomplete, split_open_bar};
use crate::ingest::cursor::{resolve_cursor, ResolvedCursor};
use crate::ingest::fetcher::{BatchFetcher, FetchOutcome};
use crate::ingest::pacer::{Pacer, Pause};
use crate::ingest::writer::PersistenceWriter;
use crate::store::OrderedStore;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Backfilling,
    CaughtUp,
    Terminated,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub start: ResolvedCursor,
    /// State the loop was in when it returned.
    pub state: LoopState,
    /// Cursor after the last committed batch.
    pub cursor: i64,
    pub fetches: usize,
    pub batches: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub idle_waits: usize,
}

/// Last provider time seen; refreshed only when a decision needs a newer one.
///
/// Provider time never goes backwards, so a bar judged complete against an
/// older reading is still complete now.
struct ProviderClock {
    last: Option<i64>,
}

impl ProviderClock {
    fn refresh(&mut self, fetcher: &BatchFetcher<'_>) -> Result<i64, IngestError> {
        let now = fetcher.provider_time()?;
        let now = self.last.map_or(now, |prev| prev.max(now));
        self.last = Some(now);
        Ok(now)
    }

    /// Provider time recent enough to judge the bar opened at `bar_timestamp`.
    fn for_bar(
        &mut self,
        fetcher: &BatchFetcher<'_>,
        timeframe: &Timeframe,
        bar_timestamp: i64,
    ) -> Result<i64, IngestError> {
        match self.last {
            Some(now) if !is_incomplete(bar_timestamp, timeframe, now) => Ok(now),
            _ => self.refresh(fetcher),
        }
    }
}

/// Ingests one symbol/timeframe pair into one store.
pub struct IngestionLoop<'a> {
    provider: &'a dyn MarketDataProvider,
    store: &'a mut dyn OrderedStore,
    pacer: &'a dyn Pacer,
    config: &'a IngestConfig,
    symbol: &'a str,
    timeframe: Timeframe,
}

impl<'a> IngestionLoop<'a> {
    pub fn new(
        provider: &'a dyn MarketDataProvider,
        store: &'a mut dyn OrderedStore,
        pacer: &'a dyn Pacer,
        config: &'a IngestConfig,
        symbol: &'a str,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            provider,
            store,
            pacer,
            config,
            symbol,
            timeframe,
        }
    }

    /// Run until caught up (one-shot) or until interrupted (continuous).
    ///
    /// `start` is an optional ISO 8601 start time; without it the run resumes
    /// from the store.
    pub fn run(self, start: Option<&str>) -> Result<IngestReport, IngestError> {
        let Self {
            provider,
            store,
            pacer,
            config,
            symbol,
            timeframe,
        } = self;

        let resolved = resolve_cursor(start, &*store, config.default_since)?;
        let fetcher = BatchFetcher::new(provider, pacer, config);
        let mut writer = PersistenceWriter::new(store);
        let mut clock = ProviderClock { last: None };

        let mut state = LoopState::Backfilling;
        let mut cursor = resolved.cursor;
        let mut report = IngestReport {
            start: resolved,
            state,
            cursor,
            fetches: 0,
            batches: 0,
            inserted: 0,
            duplicates: 0,
            idle_waits: 0,
        };

        info!(
            exchange = provider.name(),
            symbol,
            timeframe = %timeframe,
            cursor = %format_millis(cursor),
            mode = ?config.mode,
            "starting ingestion"
        );

        loop {
            match state {
                LoopState::Backfilling => {
                    if pacer.is_interrupted() {
                        return Err(IngestError::Interrupted);
                    }

                    report.fetches += 1;
                    let mut batch = match fetcher.fetch(symbol, &timeframe, cursor)? {
                        FetchOutcome::Candles(batch) => batch,
                        FetchOutcome::NoNewData => Vec::new(),
                    };
                    let fetched_any = !batch.is_empty();

                    if let Some(last) = batch.last().map(|c| c.timestamp) {
                        let now = clock.for_bar(&fetcher, &timeframe, last)?;
                        if let Some(open) = split_open_bar(&mut batch, &timeframe, now) {
                            debug!(bar = %open.iso8601(), "holding back bar that is still forming");
                        }
                    }

                    if batch.is_empty() {
                        if !fetched_any {
                            let now = clock.refresh(&fetcher)?;
                            if next_close(&timeframe, cursor).is_some_and(|close| close <= now) {
                                warn!(
                                    cursor = %format_millis(cursor),
                                    provider_time = %format_millis(now),
                                    "provider returned no candles although newer ones should exist"
                                );
                            }
                        }
                        state = LoopState::CaughtUp;
                        continue;
                    }

                    let appended = writer.persist(&batch)?;
                    report.batches += 1;
                    report.inserted += appended.inserted;
                    report.duplicates += appended.duplicates;

                    if let Some(last) = batch.last() {
                        cursor = cursor.max(last.timestamp);
                    }
                    report.cursor = cursor;
                    info!(
                        inserted = appended.inserted,
                        duplicates = appended.duplicates,
                        cursor = %format_millis(cursor),
                        "persisted batch"
                    );
                }
                LoopState::CaughtUp => match config.mode {
                    RunMode::OneShot => state = LoopState::Terminated,
                    RunMode::Continuous => {
                        idle_until_next_close(&fetcher, &mut clock, pacer, &timeframe, cursor)?;
                        report.idle_waits += 1;
                        state = LoopState::Backfilling;
                    }
                },
                LoopState::Terminated => {
                    report.state = state;
                    let rows = writer.store().summary()?.rows;
                    info!(
                        inserted = report.inserted,
                        rows,
                        cursor = %format_millis(cursor),
                        "caught up"
                    );
                    return Ok(report);
                }
            }
        }
    }
}

/// Close time of the bar that follows the one opened at `cursor`.
fn next_close(timeframe: &Timeframe, cursor: i64) -> Option<i64> {
    timeframe
        .forward_from_millis(cursor)
        .and_then(|open| timeframe.forward_from_millis(open))
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

/// Caught up in continuous mode: wait at most one interval, until the next
/// bar can have closed, then confirm against a fresh provider reading.
fn idle_until_next_close(
    fetcher: &BatchFetcher<'_>,
    clock: &mut ProviderClock,
    pacer: &dyn Pacer,
    timeframe: &Timeframe,
    cursor: i64,
) -> Result<(), IngestError> {
    let now = clock.refresh(fetcher)?;
    let interval = timeframe.span_from_millis(now);
    let close = next_close(timeframe, cursor);

    let wait = match close {
        Some(close) if close > now => interval.min(millis(close - now)),
        _ => interval,
    };
    let close_at = close.map(format_millis).unwrap_or_default();
    info!(
        wait_secs = wait.as_secs(),
        next_close = %close_at,
        "caught up; waiting for the next bar"
    );
    pacer.pause(wait, Pause::Idle)?;

    // The provider clock can lag ours; never fetch before the bar can be complete.
    let now = clock.refresh(fetcher)?;
    if let Some(close) = close {
        if close > now {
            pacer.pause(interval.min(millis(close - now)), Pause::Idle)?;
        }
    }
    Ok(())
}
