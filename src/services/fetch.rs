//! Cache-aware fetch wrappers.
//!
//! Every provider integration follows the same triple-path control flow:
//! serve a fresh cache hit, otherwise fetch live and persist on success,
//! and on fetch failure fall back to stale cached data instead of raising.
//! These helpers encode that flow once so integrations cannot get it wrong.

use crate::error::Result;
use crate::models::{CandleRecord, Granularity};
use crate::services::kline_cache::KlineCacheManager;
use crate::services::scalar_cache::ScalarCache;
use crate::models::ScalarKind;
use crate::utils::now_naive;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Get-or-fetch for a scalar/blob entry.
///
/// Paths, in order:
/// 1. `use_cache` and not `force_refresh` and the entry is valid: cache hit.
/// 2. Fetch live; on success persist (when `use_cache`) and return it.
/// 3. Fetch failed: return the possibly-stale cached payload, or an empty
///    object when there is none. Upstream errors are logged, never raised.
pub fn fetch_scalar_with_cache<F>(
    cache: &ScalarCache,
    kind: ScalarKind,
    sub_key: Option<&str>,
    use_cache: bool,
    force_refresh: bool,
    fetch: F,
) -> Value
where
    F: FnOnce() -> Result<Value>,
{
    if use_cache && !force_refresh && cache.is_cache_valid(kind, sub_key) {
        if let Some(data) = cache.get_cached_data(kind, sub_key) {
            debug!(data_type = kind.as_str(), sub_key, "Scalar cache hit");
            return data;
        }
    }

    match fetch() {
        Ok(data) => {
            if use_cache {
                cache.save_cached_data(kind, sub_key, data.clone());
            }
            data
        }
        Err(e) => {
            warn!(
                data_type = kind.as_str(),
                sub_key,
                error = %e,
                "Upstream fetch failed, falling back to cached data"
            );
            if use_cache {
                cache
                    .get_cached_data(kind, sub_key)
                    .unwrap_or_else(|| Value::Object(Map::new()))
            } else {
                Value::Object(Map::new())
            }
        }
    }
}

/// Get-or-fetch for a candle window.
///
/// The fetch closure receives the time ranges that are actually missing,
/// so a cache that is only short on its tail triggers a tail fetch, not a
/// full re-download. Fetched records are merged into an existing table or
/// replace it when starting cold or forced. On fetch failure the stale
/// cached window is returned; with nothing cached, an empty vector.
pub fn fetch_kline_with_cache<F>(
    manager: &KlineCacheManager,
    symbol: &str,
    granularity: Granularity,
    count: usize,
    use_cache: bool,
    force_refresh: bool,
    fetch: F,
) -> Vec<CandleRecord>
where
    F: FnOnce(&[(NaiveDateTime, NaiveDateTime)]) -> Result<Vec<CandleRecord>>,
{
    if use_cache && !force_refresh {
        if let Some(records) = manager.get_cached_kline(symbol, granularity, count) {
            if records.len() >= count {
                debug!(symbol, granularity = %granularity, count, "Kline cache hit");
                return records;
            }
        }
    }

    let ranges = if use_cache && !force_refresh {
        manager.analyze_missing_ranges(symbol, granularity, count)
    } else {
        let now = now_naive();
        vec![(now - granularity.period() * count as i32, now)]
    };

    match fetch(&ranges) {
        Ok(new_records) => {
            if !use_cache {
                return new_records;
            }
            let had_cache = !manager.get_stale_kline(symbol, granularity, 1).is_empty();
            if had_cache && !force_refresh {
                manager.update_kline_data(symbol, granularity, new_records);
            } else {
                manager.cache_kline(symbol, granularity, count, new_records);
            }
            manager
                .get_cached_kline(symbol, granularity, count)
                .unwrap_or_else(|| manager.get_stale_kline(symbol, granularity, count))
        }
        Err(e) => {
            warn!(
                symbol,
                granularity = %granularity,
                error = %e,
                "Upstream kline fetch failed, falling back to cached data"
            );
            if use_cache {
                manager.get_stale_kline(symbol, granularity, count)
            } else {
                Vec::new()
            }
        }
    }
}
