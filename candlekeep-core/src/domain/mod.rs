//! Domain types for candlekeep

pub mod candle;
pub mod timeframe;

pub use candle::{format_millis, Candle};
pub use timeframe::{TimeUnit, Timeframe, TimeframeError};
