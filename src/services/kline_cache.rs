//! Kline cache manager.
//!
//! Orchestrates the flat-file store and the freshness policy to answer
//! "give me N records for symbol X", merge newly fetched records, and tell
//! callers which time window still needs an upstream fetch. Write failures
//! are logged and swallowed: a lost cache write costs one refetch, never an
//! error surfaced to the caller.

use crate::models::{CandleRecord, DataType, Granularity};
use crate::services::freshness::{is_fresh, parse_record_timestamp};
use crate::services::kline_store::KlineStore;
use crate::utils::{get_cache_dir, now_naive};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Per-granularity cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct GranularityStats {
    pub file_size_bytes: u64,
    pub total_records: usize,
    /// Record count per symbol
    pub symbols: HashMap<String, usize>,
}

/// Read-only introspection of the whole kline cache
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub granularities: HashMap<String, GranularityStats>,
    pub total_records: usize,
    pub total_size_bytes: u64,
}

pub struct KlineCacheManager {
    store: KlineStore,
}

impl KlineCacheManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: KlineStore::new(cache_dir),
        }
    }

    /// Manager rooted at the configured cache directory
    /// (`KLINE_CACHE_DIR` env var, default `data/cache`)
    pub fn from_env() -> Self {
        Self::new(get_cache_dir())
    }

    pub fn store(&self) -> &KlineStore {
        &self.store
    }

    /// Fresh cached records for a symbol, last `count`, or `None` when the
    /// cache holds nothing usable
    pub fn get_cached_kline(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Option<Vec<CandleRecord>> {
        self.store.get(symbol, granularity, count, now_naive())
    }

    /// Cached records regardless of freshness; the stale-fallback path
    pub fn get_stale_kline(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Vec<CandleRecord> {
        self.store.get_ignoring_freshness(symbol, granularity, count)
    }

    /// Full-refresh semantics: the caller holds the authoritative window,
    /// so prior rows for the symbol are dropped. `count` is the window the
    /// caller requested upstream, recorded for diagnostics only.
    pub fn cache_kline(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
        records: Vec<CandleRecord>,
    ) {
        let stored = records.len();
        if let Err(e) = self.store.replace_symbol(symbol, granularity, records) {
            warn!(
                symbol,
                granularity = %granularity,
                error = %e,
                "Failed to write kline cache, continuing without it"
            );
            return;
        }
        debug!(
            symbol,
            granularity = %granularity,
            requested = count,
            stored,
            "Replaced cached kline window"
        );
    }

    /// Incremental semantics: upsert a recently fetched slice into the
    /// existing table, deduplicating on (symbol, timestamp)
    pub fn update_kline_data(
        &self,
        symbol: &str,
        granularity: Granularity,
        new_records: Vec<CandleRecord>,
    ) {
        let merged = new_records.len();
        if let Err(e) = self.store.merge_symbol(symbol, granularity, new_records) {
            warn!(
                symbol,
                granularity = %granularity,
                error = %e,
                "Failed to merge kline cache, continuing without it"
            );
            return;
        }
        debug!(
            symbol,
            granularity = %granularity,
            merged,
            "Merged records into kline cache"
        );
    }

    /// Which time window still needs an upstream fetch.
    ///
    /// Empty cache: one range covering `[now - count * period, now]`.
    /// Cache present but short on fresh records: one range from the latest
    /// cached timestamp to now, so only the tail is refetched.
    /// Cache sufficient: no ranges.
    pub fn analyze_missing_ranges(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let now = now_naive();
        let mut records: Vec<CandleRecord> = self
            .store
            .load_all(granularity)
            .into_iter()
            .filter(|r| r.symbol == symbol)
            .collect();

        if records.is_empty() {
            let start = now - granularity.period() * count as i32;
            return vec![(start, now)];
        }

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let fresh = records
            .iter()
            .filter(|r| is_fresh(&r.timestamp, &r.fetch_time, granularity, now))
            .count();
        if fresh >= count {
            return Vec::new();
        }

        // Latest cached timestamp, fresh or not; only the tail is missing
        let latest = records
            .last()
            .and_then(|r| parse_record_timestamp(&r.timestamp, granularity).ok());
        match latest {
            Some(start) => vec![(start, now)],
            None => {
                let start = now - granularity.period() * count as i32;
                vec![(start, now)]
            }
        }
    }

    /// Clear cached data. Dispatch:
    /// - `(Some(symbol), Some(granularity))`: that symbol in that store
    /// - `(Some(symbol), None)`: that symbol across all granularities
    /// - `(None, Some(granularity))`: that entire store
    /// - `(None, None)`: everything
    pub fn clear_cache(&self, symbol: Option<&str>, granularity: Option<Granularity>) {
        let granularities = match granularity {
            Some(g) => vec![g],
            None => Granularity::all(),
        };

        for g in granularities {
            let result = match symbol {
                Some(sym) => self.store.remove_symbol(sym, g).map(|removed| {
                    if removed > 0 {
                        info!(symbol = sym, granularity = %g, removed, "Cleared symbol from kline cache");
                    }
                }),
                None => self.store.remove_file(g).map(|_| {
                    info!(granularity = %g, "Cleared kline cache file");
                }),
            };
            if let Err(e) = result {
                warn!(granularity = %g, error = %e, "Failed to clear kline cache");
            }
        }
    }

    /// On-demand sweep removing records that are no longer fresh.
    /// Returns how many records were dropped.
    pub fn clear_expired_cache(&self) -> usize {
        let now = now_naive();
        let mut removed_total = 0usize;
        for g in Granularity::all() {
            let table = self.store.load_all(g);
            if table.is_empty() {
                continue;
            }
            let before = table.len();
            let kept: Vec<CandleRecord> = table
                .into_iter()
                .filter(|r| is_fresh(&r.timestamp, &r.fetch_time, g, now))
                .collect();
            let removed = before - kept.len();
            if removed == 0 {
                continue;
            }
            if let Err(e) = self.store.save_all(g, &kept) {
                warn!(granularity = %g, error = %e, "Failed to persist expiry sweep");
                continue;
            }
            info!(granularity = %g, removed, kept = kept.len(), "Swept expired kline records");
            removed_total += removed;
        }
        removed_total
    }

    /// Index wrapper: replace an index series in the dedicated index store
    pub fn cache_index_kline(&self, symbol: &str, count: usize, mut records: Vec<CandleRecord>) {
        for r in &mut records {
            r.data_type = DataType::Index;
        }
        self.cache_kline(symbol, Granularity::IndexDaily, count, records);
    }

    /// Index wrapper: fresh cached index series
    pub fn get_cached_index_kline(&self, symbol: &str, count: usize) -> Option<Vec<CandleRecord>> {
        self.get_cached_kline(symbol, Granularity::IndexDaily, count)
    }

    /// Index wrapper: merge an index slice
    pub fn update_index_kline(&self, symbol: &str, mut new_records: Vec<CandleRecord>) {
        for r in &mut new_records {
            r.data_type = DataType::Index;
        }
        self.update_kline_data(symbol, Granularity::IndexDaily, new_records);
    }

    /// Per-granularity file sizes, per-symbol record counts, and totals
    pub fn get_cache_stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for g in Granularity::all() {
            let path = self.store.file_path(g);
            if !path.exists() {
                continue;
            }
            let file_size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let table = self.store.load_all(g);
            let mut symbols: HashMap<String, usize> = HashMap::new();
            for record in &table {
                *symbols.entry(record.symbol.clone()).or_insert(0) += 1;
            }
            stats.total_records += table.len();
            stats.total_size_bytes += file_size_bytes;
            stats.granularities.insert(
                g.as_str().to_string(),
                GranularityStats {
                    file_size_bytes,
                    total_records: table.len(),
                    symbols,
                },
            );
        }
        stats
    }
}
