//! SQLite-backed ordered store.
//!
//! One database file per exchange/symbol/timeframe with a single `candles`
//! table. Prices are TEXT so the provider's decimal strings survive untouched.
//! The journal runs in WAL mode so external readers never block the writer.

use super::{AppendReport, OrderedStore, StoreError, StoreSummary};
use crate::domain::Candle;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS candles (
        timestamp INTEGER PRIMARY KEY,
        open TEXT NOT NULL,
        high TEXT NOT NULL,
        low TEXT NOT NULL,
        close TEXT NOT NULL,
        volume TEXT NOT NULL
    );
"#;

fn fault(e: rusqlite::Error) -> StoreError {
    StoreError::Fault(e.to_string())
}

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating directories, file and schema as needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let open_err = |reason: String| StoreError::Open {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| open_err(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| open_err(e.to_string()))?;
        // Pragmas (best-effort).
        let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0));
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory store, gone when dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".into(),
            reason: e.to_string(),
        })?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        Ok(Self { conn, path })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connection, surfacing any error a plain drop would swallow.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| fault(e))
    }
}

impl OrderedStore for SqliteStore {
    fn append(&mut self, candles: &[Candle]) -> Result<AppendReport, StoreError> {
        let mut report = AppendReport::default();
        if candles.is_empty() {
            return Ok(report);
        }

        // Dropping the transaction without commit rolls the batch back.
        let tx = self.conn.transaction().map_err(fault)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    r#"
                    INSERT INTO candles (timestamp, open, high, low, close, volume)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(timestamp) DO NOTHING
                    "#,
                )
                .map_err(fault)?;

            for c in candles {
                let changed = stmt
                    .execute(params![c.timestamp, c.open, c.high, c.low, c.close, c.volume])
                    .map_err(fault)?;
                if changed == 0 {
                    report.duplicates += 1;
                } else {
                    report.inserted += 1;
                }
            }
        }
        tx.commit().map_err(fault)?;
        Ok(report)
    }

    fn latest_timestamp(&self) -> Result<Option<i64>, StoreError> {
        self.conn
            .query_row("SELECT MAX(timestamp) FROM candles", [], |row| row.get(0))
            .map_err(fault)
    }

    fn summary(&self) -> Result<StoreSummary, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM candles",
                [],
                |row| {
                    Ok(StoreSummary {
                        rows: row.get::<_, i64>(0)?.max(0) as u64,
                        first: row.get(1)?,
                        last: row.get(2)?,
                    })
                },
            )
            .map_err(fault)
    }

    fn scan(&self) -> Result<Vec<Candle>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT timestamp, open, high, low, close, volume FROM candles ORDER BY timestamp",
            )
            .map_err(fault)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Candle {
                    timestamp: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(fault)?;
        let candles = rows.collect::<Result<Vec<_>, _>>().map_err(fault)?;
        Ok(candles)
    }
}
