//! Persistence writer: one store transaction per batch.

use crate::domain::Candle;
use crate::store::{AppendReport, OrderedStore, StoreError};
use tracing::debug;

/// Appends batches to an [`OrderedStore`]. Never touches the cursor.
pub struct PersistenceWriter<'a> {
    store: &'a mut dyn OrderedStore,
}

impl<'a> PersistenceWriter<'a> {
    pub fn new(store: &'a mut dyn OrderedStore) -> Self {
        Self { store }
    }

    /// Append `candles` atomically. Already-stored timestamps are skipped;
    /// any other failure leaves the store as it was.
    pub fn persist(&mut self, candles: &[Candle]) -> Result<AppendReport, StoreError> {
        let report = self.store.append(candles)?;

        for c in candles {
            debug!(
                time = %c.iso8601(),
                open = %c.open,
                high = %c.high,
                low = %c.low,
                close = %c.close,
                volume = %c.volume,
                "candle"
            );
        }
        if report.duplicates > 0 {
            debug!(duplicates = report.duplicates, "skipped candles already in the store");
        }
        Ok(report)
    }

    pub fn store(&self) -> &dyn OrderedStore {
        &*self.store
    }
}
