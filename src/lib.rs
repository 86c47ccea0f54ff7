//! File-backed caching and staleness detection for equity/index market data.
//!
//! Sits between rate-limited upstream market-data providers and the rest of
//! an analysis system. Candle series live in one CSV per granularity with
//! per-record freshness (settled history is permanently fresh, the current
//! bucket expires on a granularity TTL); whole-document values (sentiment
//! snapshots, valuations, AI analysis text) live in per-domain JSON stores
//! under per-type TTLs. The fetch wrappers in [`services::fetch`] encode
//! the uniform contract: serve a fresh cache hit, otherwise fetch and
//! persist, and on upstream failure fall back to stale cached data rather
//! than raising.
//!
//! Single-process, synchronous, whole-file read-merge-write; concurrent
//! writers race with last-writer-wins, and a corrupt file is treated as an
//! empty cache on the next load.
//!
//! Construct one [`KlineCacheManager`] and the [`ScalarCache`] domains at
//! process start and pass them to callers; there is no ambient global
//! state.

pub mod constants;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{CacheError, Result};
pub use models::{
    AnalysisKind, AnalysisResult, CandleRecord, CandleSeries, DataType, Granularity, ScalarKind,
    SentimentSnapshot, ValuationSnapshot,
};
pub use services::fetch::{fetch_kline_with_cache, fetch_scalar_with_cache};
pub use services::freshness::is_fresh;
pub use services::kline_cache::{CacheStats, GranularityStats, KlineCacheManager};
pub use services::kline_store::KlineStore;
pub use services::scalar_cache::{CacheMeta, ScalarCache, ScalarEntry};
