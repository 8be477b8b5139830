//! Preflight checks run before any candle is requested.

use crate::data::OhlcvSupport;
use crate::domain::Timeframe;
use crate::error::{ConfigError, IngestError};
use crate::ingest::fetcher::BatchFetcher;
use tracing::debug;

/// Check that the provider can serve `symbol` at `timeframe`.
///
/// Capability and timeframe checks are local; the symbol check loads the
/// exchange's market list through the fetcher's retry path.
pub fn preflight(fetcher: &BatchFetcher<'_>, symbol: &str, timeframe: &Timeframe) -> Result<(), IngestError> {
    let provider = fetcher.provider();
    let exchange = provider.name().to_string();

    match provider.ohlcv_support() {
        OhlcvSupport::Native => {}
        OhlcvSupport::Emulated => return Err(ConfigError::OhlcvEmulated { exchange }.into()),
        OhlcvSupport::Unsupported => return Err(ConfigError::OhlcvUnsupported { exchange }.into()),
    }

    let code = timeframe.code();
    if !provider.supports_timeframe(&code) {
        return Err(ConfigError::TimeframeUnavailable {
            timeframe: code,
            exchange,
            available: provider.timeframes(),
        }
        .into());
    }

    let symbols = fetcher.symbols()?;
    if !symbols.contains(symbol) {
        return Err(ConfigError::SymbolUnavailable {
            symbol: symbol.to_string(),
            exchange,
            available: symbols.into_iter().collect(),
        }
        .into());
    }

    debug!(%exchange, symbol, timeframe = %code, "preflight passed");
    Ok(())
}
