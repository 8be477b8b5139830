//! Market data providers and the exchange registry

pub mod binance;
pub mod provider;

pub use binance::BinanceProvider;
pub use provider::{MarketDataProvider, OhlcvSupport, ProviderError};

use crate::error::ConfigError;

/// Exchange identifiers `connect` knows how to build, with their REST roots.
const EXCHANGES: &[(&str, &str)] = &[
    ("binance", "https://api.binance.com"),
    ("binanceus", "https://api.binance.us"),
];

/// Registered exchange identifiers.
pub fn exchange_ids() -> Vec<String> {
    EXCHANGES.iter().map(|(id, _)| id.to_string()).collect()
}

/// Build the provider for an exchange identifier.
pub fn connect(exchange: &str, page_limit: u32) -> Result<Box<dyn MarketDataProvider>, ConfigError> {
    let (id, base_url) = EXCHANGES
        .iter()
        .find(|(id, _)| *id == exchange)
        .ok_or_else(|| ConfigError::UnknownExchange {
            exchange: exchange.to_string(),
            available: exchange_ids(),
        })?;

    let provider = BinanceProvider::new(id, base_url)
        .map_err(|e| ConfigError::InvalidSettings(format!("cannot build {id} client: {e}")))?
        .with_page_limit(page_limit);
    Ok(Box::new(provider))
}
