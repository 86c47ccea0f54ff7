use crate::error::{CacheError, Result};
use crate::utils::now_string;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a candle series belongs to an individual stock or a market index.
///
/// Informational tag only; index series get their own store because index
/// and stock symbols can collide (e.g. a code reused across namespaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Stock,
    Index,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Stock => "stock",
            DataType::Index => "index",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Stock
    }
}

/// One OHLCV candle as cached on disk.
///
/// Timestamps are kept as strings in the stored format (`YYYY-MM-DD` for
/// daily and coarser, `YYYY-MM-DD HH:MM:SS` for intraday); the freshness
/// policy parses them on demand so that a malformed row degrades to "stale"
/// instead of poisoning a whole file load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Stock code, index name, or ETF code
    pub symbol: String,

    /// Candle timestamp in stored string form
    #[serde(rename = "datetime")]
    pub timestamp: String,

    /// Opening price
    pub open: f64,

    /// Highest price
    pub high: f64,

    /// Lowest price
    pub low: f64,

    /// Closing price
    pub close: f64,

    /// Trading volume (number of shares)
    pub volume: u64,

    /// Turnover value, absent for providers that do not report it
    pub amount: Option<f64>,

    /// When this record was retrieved from the upstream provider
    pub fetch_time: String,

    /// Stock vs index tag
    pub data_type: DataType,
}

impl CandleRecord {
    /// Create a candle, rejecting OHLC-inconsistent tuples.
    ///
    /// `high` must bound `open`/`close` from above and `low` from below;
    /// a violation signals a corrupt upstream response and fails
    /// construction with `CacheError::InvalidRecord`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timestamp: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        amount: Option<f64>,
        data_type: DataType,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let timestamp = timestamp.into();

        if high < open.max(close) || low > open.min(close) {
            return Err(CacheError::InvalidRecord(format!(
                "OHLC inconsistent for {} at {}: open={}, high={}, low={}, close={}",
                symbol, timestamp, open, high, low, close
            )));
        }

        Ok(Self {
            symbol,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            amount,
            fetch_time: now_string(),
            data_type,
        })
    }

    /// Override the fetch time (used when replaying provider responses
    /// that carry their own retrieval timestamp, and by tests)
    pub fn with_fetch_time(mut self, fetch_time: impl Into<String>) -> Self {
        self.fetch_time = fetch_time.into();
        self
    }
}
