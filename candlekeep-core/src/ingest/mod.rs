//! Resumable candle ingestion: cursor resolution, paced fetching, completeness
//! filtering, persistence and the loop that ties them together.

pub mod completeness;
pub mod cursor;
pub mod fetcher;
pub mod loop_runner;
pub mod pacer;
pub mod preflight;
pub mod writer;

pub use completeness::{is_incomplete, split_open_bar};
pub use cursor::{parse_iso8601, resolve_cursor, CursorSource, ResolvedCursor};
pub use fetcher::{BatchFetcher, FetchOutcome};
pub use loop_runner::{IngestReport, IngestionLoop, LoopState};
pub use pacer::{Interrupted, Pacer, Pause, Shutdown};
pub use preflight::preflight;
pub use writer::PersistenceWriter;
