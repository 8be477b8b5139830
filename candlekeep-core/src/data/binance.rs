//! Binance spot market data provider.
//!
//! Reads klines, server time and market metadata from the public REST API.
//! No retries happen here: every failure is classified into a
//! [`ProviderError`] and the batch fetcher decides whether to try again.

use super::provider::{MarketDataProvider, OhlcvSupport, ProviderError};
use crate::config::MIN_PAGE_LIMIT;
use crate::domain::{Candle, Timeframe};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// Largest page the klines endpoint will return.
pub const MAX_PAGE_LIMIT: u32 = 1000;

const TIMEFRAMES: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

#[derive(Debug, Deserialize)]
struct ServerTime {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<MarketInfo>,
}

#[derive(Debug, Deserialize)]
struct MarketInfo {
    symbol: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance (or Binance.US) spot provider.
pub struct BinanceProvider {
    name: String,
    client: Client,
    base_url: String,
    page_limit: u32,
    /// Unified symbol (`BTC/USDT`) → exchange symbol (`BTCUSDT`), loaded once.
    markets: Mutex<Option<HashMap<String, String>>>,
}

impl BinanceProvider {
    pub fn new(name: &str, base_url: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("candlekeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::NetworkUnreachable(format!("http client: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: MAX_PAGE_LIMIT,
            markets: Mutex::new(None),
        })
    }

    /// Bars requested per page, clamped to `MIN_PAGE_LIMIT..=MAX_PAGE_LIMIT`.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT);
        self
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| ProviderError::NetworkUnreachable(e.to_string()))?;
        check_status(resp)
    }

    fn markets(&self) -> Result<HashMap<String, String>, ProviderError> {
        let mut guard = self
            .markets
            .lock()
            .map_err(|_| ProviderError::Rejected("market cache poisoned".into()))?;
        if let Some(markets) = guard.as_ref() {
            return Ok(markets.clone());
        }

        let info: ExchangeInfo = self
            .get("/api/v3/exchangeInfo", &[])?
            .json()
            .map_err(|e| ProviderError::ResponseMalformed(format!("exchangeInfo: {e}")))?;
        let markets: HashMap<String, String> = info
            .symbols
            .into_iter()
            .map(|m| (format!("{}/{}", m.base_asset, m.quote_asset), m.symbol))
            .collect();
        *guard = Some(markets.clone());
        Ok(markets)
    }

    fn market_id(&self, symbol: &str) -> Result<String, ProviderError> {
        self.markets()?
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::BadSymbol {
                symbol: symbol.to_string(),
            })
    }
}

/// Map HTTP status codes onto provider error kinds.
fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        let retry_after_secs = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status.is_server_error() || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::ExchangeUnavailable {
            status: status.as_u16(),
        });
    }

    let body = resp.text().unwrap_or_default();
    Err(classify_api_error(status, &body))
}

fn classify_api_error(status: StatusCode, body: &str) -> ProviderError {
    match serde_json::from_str::<ApiError>(body) {
        // -1121: invalid symbol, -1120: invalid interval
        Ok(err) if err.code == -1121 => ProviderError::BadSymbol { symbol: err.msg },
        Ok(err) if err.code == -1120 => ProviderError::UnsupportedTimeframe { timeframe: err.msg },
        Ok(err) => ProviderError::Rejected(format!("HTTP {status}: {} ({})", err.msg, err.code)),
        Err(_) => ProviderError::Rejected(format!("HTTP {status}: {body}")),
    }
}

/// Parse a klines payload: `[[openTime, "o", "h", "l", "c", "v", closeTime, ...], ...]`.
fn parse_klines(rows: Vec<Vec<Value>>) -> Result<Vec<Candle>, ProviderError> {
    let field = |row: &[Value], i: usize| -> Result<String, ProviderError> {
        match row.get(i) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            other => Err(ProviderError::ResponseMalformed(format!(
                "kline field {i}: expected decimal string, got {other:?}"
            ))),
        }
    };

    rows.iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(ProviderError::ResponseMalformed(format!(
                    "kline row has {} fields, expected at least 6",
                    row.len()
                )));
            }
            let timestamp = row[0].as_i64().ok_or_else(|| {
                ProviderError::ResponseMalformed(format!("kline open time: {:?}", row[0]))
            })?;
            Ok(Candle {
                timestamp,
                open: field(row, 1)?,
                high: field(row, 2)?,
                low: field(row, 3)?,
                close: field(row, 4)?,
                volume: field(row, 5)?,
            })
        })
        .collect()
}

impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since_millis: i64,
    ) -> Result<Vec<Candle>, ProviderError> {
        let code = timeframe.code();
        if !self.supports_timeframe(&code) {
            return Err(ProviderError::UnsupportedTimeframe { timeframe: code });
        }
        let market = self.market_id(symbol)?;

        let rows: Vec<Vec<Value>> = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", market),
                    ("interval", code),
                    ("startTime", since_millis.to_string()),
                    ("limit", self.page_limit.to_string()),
                ],
            )?
            .json()
            .map_err(|e| ProviderError::ResponseMalformed(format!("klines: {e}")))?;

        parse_klines(rows)
    }

    fn now_millis(&self) -> Result<i64, ProviderError> {
        let time: ServerTime = self
            .get("/api/v3/time", &[])?
            .json()
            .map_err(|e| ProviderError::ResponseMalformed(format!("time: {e}")))?;
        Ok(time.server_time)
    }

    fn ohlcv_support(&self) -> OhlcvSupport {
        OhlcvSupport::Native
    }

    fn timeframes(&self) -> Vec<String> {
        TIMEFRAMES.iter().map(|s| s.to_string()).collect()
    }

    fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
        Ok(self.markets()?.into_keys().collect())
    }

    fn rate_limit(&self) -> Duration {
        Duration::from_millis(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_rows() {
        let rows: Vec<Vec<Value>> = serde_json::from_value(json!([
            [1704412800000i64, "42836.87", "44700.00", "42446.10", "44151.10", "48038.06334000",
             1704499199999i64, "2099405000.1", 1682531, "24052.1", "1051400000.2", "0"],
            [1704499200000i64, "44151.10", "44357.46", "43402.83", "43966.52", "32231.47045000",
             1704585599999i64, "1413200000.3", 1254103, "15933.9", "698800000.7", "0"]
        ]))
        .unwrap();

        let candles = parse_klines(rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_704_412_800_000);
        assert_eq!(candles[0].volume, "48038.06334000");
        assert_eq!(candles[1].close, "43966.52");
    }

    #[test]
    fn short_rows_are_malformed() {
        let rows: Vec<Vec<Value>> =
            serde_json::from_value(json!([[1704412800000i64, "1.0", "2.0"]])).unwrap();
        let err = parse_klines(rows).unwrap_err();
        assert!(matches!(err, ProviderError::ResponseMalformed(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn api_error_codes_are_classified() {
        let err = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1121,"msg":"Invalid symbol."}"#,
        );
        assert!(matches!(err, ProviderError::BadSymbol { .. }));
        assert!(!err.is_transient());

        let err = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1120,"msg":"Invalid interval."}"#,
        );
        assert!(matches!(err, ProviderError::UnsupportedTimeframe { .. }));

        let err = classify_api_error(StatusCode::BAD_REQUEST, "<html>oops</html>");
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[test]
    fn offers_month_but_not_year_bars() {
        let provider = BinanceProvider::new("binance", "https://api.binance.com").unwrap();
        assert!(provider.supports_timeframe("1M"));
        assert!(provider.supports_timeframe("1d"));
        assert!(!provider.supports_timeframe("1y"));
    }

    #[test]
    fn page_limit_is_clamped() {
        let provider = BinanceProvider::new("binance", "https://api.binance.com")
            .unwrap()
            .with_page_limit(5000);
        assert_eq!(provider.page_limit, MAX_PAGE_LIMIT);

        // A one-bar page would only ever return the bar at the cursor.
        let provider = BinanceProvider::new("binance", "https://api.binance.com")
            .unwrap()
            .with_page_limit(1);
        assert_eq!(provider.page_limit, MIN_PAGE_LIMIT);
    }
}
