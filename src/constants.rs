//! Cache Layout Constants
//!
//! Defines the k-line CSV column layout, timestamp formats, and the
//! boundaries of the freshness policy's historical short-circuit.
//!
//! TTL tables live on the `Granularity`, `ScalarKind` and `AnalysisKind`
//! enums; the values here are everything else that must stay stable for
//! existing cache files to remain readable.

/// Number of columns in a k-line cache CSV row
pub const KLINE_CSV_COLUMNS: usize = 10;

/// Column indices for the k-line cache CSV format (0-indexed)
pub mod csv_column {
    pub const SYMBOL: usize = 0;
    pub const DATETIME: usize = 1;
    pub const OPEN: usize = 2;
    pub const HIGH: usize = 3;
    pub const LOW: usize = 4;
    pub const CLOSE: usize = 5;
    pub const VOLUME: usize = 6;
    pub const AMOUNT: usize = 7;
    pub const FETCH_TIME: usize = 8;
    pub const DATA_TYPE: usize = 9;
}

/// Timestamp format for daily and coarser candles
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format for intraday candles and all fetch times
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Daily+ candles dated more than this many days before now are settled
/// history and never refetched
pub const HISTORICAL_GRACE_DAYS: i64 = 2;

/// Intraday candles older than this many seconds are settled history
pub const HISTORICAL_GRACE_SECS: i64 = 3600;

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "KLINE_CACHE_DIR";

/// Default cache directory relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "data/cache";

/// File name of the market-wide scalar cache document
pub const MARKET_CACHE_FILE: &str = "market_cache.json";

/// File name of the per-stock scalar cache document
pub const STOCK_CACHE_FILE: &str = "stock_cache.json";
