//! Scalar/blob cache: whole-document values under a single TTL per type.
//!
//! One JSON document per cache domain (market-wide vs per-stock) holds all
//! entries, keyed by `<data_type>` or `<data_type>_<sub_key>`. Entries are
//! overwritten wholesale on every successful fetch; validity is a simple
//! TTL check against the entry's own metadata, with two refinements:
//! per-stock AI analysis sub-types carry finer TTLs, and the comprehensive
//! analysis entry is also invalidated when the caller's opinion/position
//! inputs no longer match what was cached at generation time.

use crate::constants::{DATETIME_FORMAT, MARKET_CACHE_FILE, STOCK_CACHE_FILE};
use crate::error::Result;
use crate::models::{AnalysisKind, ScalarKind};
use crate::utils::{now_naive, now_string, sanitize_json, write_atomic};
use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metadata stored alongside every cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// When the entry was written, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
    pub data_type: String,
    pub expire_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_opinion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_position: Option<String>,
    /// Caller-defined extra fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarEntry {
    pub cache_meta: CacheMeta,
    pub data: Value,
}

type ScalarStore = BTreeMap<String, ScalarEntry>;

/// One cache domain backed by one JSON document
pub struct ScalarCache {
    path: PathBuf,
    domain: &'static str,
}

impl ScalarCache {
    /// Market-wide domain (sentiment, valuation, money flow, indices)
    pub fn market(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(MARKET_CACHE_FILE),
            domain: "market",
        }
    }

    /// Per-stock domain (AI analysis, technical indicator snapshots)
    pub fn stock(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(STOCK_CACHE_FILE),
            domain: "stock",
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_key(kind: ScalarKind, sub_key: Option<&str>) -> String {
        match sub_key {
            Some(sub) => format!("{}_{}", kind.as_str(), sub),
            None => kind.as_str().to_string(),
        }
    }

    fn analysis_sub_key(symbol: &str, analysis: AnalysisKind) -> String {
        format!("{}_{}", symbol, analysis.as_str())
    }

    /// Load the whole store; any read or parse failure yields an empty
    /// store so a corrupt file costs a refetch, not an error
    fn load_store(&self) -> ScalarStore {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<ScalarStore>(&content) {
                Ok(store) => store,
                Err(e) => {
                    warn!(
                        domain = self.domain,
                        path = %self.path.display(),
                        error = %e,
                        "Failed to parse scalar cache, treating as empty"
                    );
                    ScalarStore::new()
                }
            },
            Err(_) => {
                debug!(
                    domain = self.domain,
                    path = %self.path.display(),
                    "No scalar cache file yet"
                );
                ScalarStore::new()
            }
        }
    }

    fn save_store(&self, store: &ScalarStore) -> Result<()> {
        let content = serde_json::to_string_pretty(store)?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    /// Effective TTL for an entry: AI-analysis entries with a recognized
    /// `analysis_type` use the sub-type TTL, everything else uses the TTL
    /// recorded at save time
    fn effective_expire_minutes(meta: &CacheMeta) -> i64 {
        if meta.data_type == ScalarKind::AiAnalysis.as_str() {
            if let Some(kind) = meta.analysis_type.as_deref().and_then(AnalysisKind::parse) {
                return kind.expire_minutes();
            }
        }
        meta.expire_minutes
    }

    fn entry_within_ttl(meta: &CacheMeta, now: NaiveDateTime) -> bool {
        let written = match NaiveDateTime::parse_from_str(&meta.timestamp, DATETIME_FORMAT) {
            Ok(dt) => dt,
            Err(e) => {
                warn!(
                    data_type = meta.data_type,
                    timestamp = meta.timestamp,
                    error = %e,
                    "Unparseable cache timestamp, treating entry as expired"
                );
                return false;
            }
        };
        now - written < Duration::minutes(Self::effective_expire_minutes(meta))
    }

    /// Whether an entry exists and is within its TTL
    pub fn is_cache_valid(&self, kind: ScalarKind, sub_key: Option<&str>) -> bool {
        let store = self.load_store();
        match store.get(&Self::entry_key(kind, sub_key)) {
            Some(entry) => Self::entry_within_ttl(&entry.cache_meta, now_naive()),
            None => false,
        }
    }

    /// Validity of a per-stock analysis entry.
    ///
    /// Comprehensive analysis is additionally content-addressed: even an
    /// unexpired entry is invalid when the supplied opinion or position
    /// differs from what was cached at generation time.
    pub fn is_analysis_valid(
        &self,
        symbol: &str,
        analysis: AnalysisKind,
        user_opinion: Option<&str>,
        user_position: Option<&str>,
    ) -> bool {
        let store = self.load_store();
        let key = Self::entry_key(
            ScalarKind::AiAnalysis,
            Some(&Self::analysis_sub_key(symbol, analysis)),
        );
        let entry = match store.get(&key) {
            Some(entry) => entry,
            None => return false,
        };
        if !Self::entry_within_ttl(&entry.cache_meta, now_naive()) {
            return false;
        }
        if analysis == AnalysisKind::Comprehensive {
            let meta = &entry.cache_meta;
            if meta.user_opinion.as_deref() != user_opinion
                || meta.user_position.as_deref() != user_position
            {
                debug!(
                    symbol,
                    "Comprehensive analysis inputs changed, forcing regeneration"
                );
                return false;
            }
        }
        true
    }

    /// The cached payload, unconditionally. Callers either check
    /// `is_cache_valid` first or accept stale data as a fallback.
    pub fn get_cached_data(&self, kind: ScalarKind, sub_key: Option<&str>) -> Option<Value> {
        self.load_store()
            .remove(&Self::entry_key(kind, sub_key))
            .map(|entry| entry.data)
    }

    /// Typed read of a cached payload
    pub fn get_cached<T: DeserializeOwned>(
        &self,
        kind: ScalarKind,
        sub_key: Option<&str>,
    ) -> Option<T> {
        let value = self.get_cached_data(kind, sub_key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(
                    domain = self.domain,
                    data_type = kind.as_str(),
                    error = %e,
                    "Cached payload does not match expected shape"
                );
                None
            }
        }
    }

    /// Overwrite an entry wholesale, stamping the metadata with now.
    /// Non-finite floats in the payload are replaced with null before
    /// serialization. Write failures are logged and swallowed.
    pub fn save_cached_data(&self, kind: ScalarKind, sub_key: Option<&str>, data: Value) {
        let meta = CacheMeta {
            timestamp: now_string(),
            data_type: kind.as_str().to_string(),
            expire_minutes: kind.expire_minutes(),
            analysis_type: None,
            user_opinion: None,
            user_position: None,
            extra: BTreeMap::new(),
        };
        self.save_entry(Self::entry_key(kind, sub_key), meta, data);
    }

    /// Save a typed payload
    pub fn save_cached<T: Serialize>(&self, kind: ScalarKind, sub_key: Option<&str>, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.save_cached_data(kind, sub_key, value),
            Err(e) => {
                warn!(
                    domain = self.domain,
                    data_type = kind.as_str(),
                    error = %e,
                    "Failed to serialize payload for cache"
                );
            }
        }
    }

    /// Save a per-stock analysis entry, recording the sub-type and, for
    /// comprehensive analysis, the opinion/position inputs it was
    /// generated from
    pub fn save_analysis(
        &self,
        symbol: &str,
        analysis: AnalysisKind,
        user_opinion: Option<&str>,
        user_position: Option<&str>,
        data: Value,
    ) {
        let meta = CacheMeta {
            timestamp: now_string(),
            data_type: ScalarKind::AiAnalysis.as_str().to_string(),
            expire_minutes: analysis.expire_minutes(),
            analysis_type: Some(analysis.as_str().to_string()),
            user_opinion: user_opinion.map(str::to_string),
            user_position: user_position.map(str::to_string),
            extra: BTreeMap::new(),
        };
        let key = Self::entry_key(
            ScalarKind::AiAnalysis,
            Some(&Self::analysis_sub_key(symbol, analysis)),
        );
        self.save_entry(key, meta, data);
    }

    /// The cached analysis payload for a symbol, unconditionally
    pub fn get_cached_analysis(&self, symbol: &str, analysis: AnalysisKind) -> Option<Value> {
        self.get_cached_data(
            ScalarKind::AiAnalysis,
            Some(&Self::analysis_sub_key(symbol, analysis)),
        )
    }

    fn save_entry(&self, key: String, meta: CacheMeta, mut data: Value) {
        sanitize_json(&mut data);
        let mut store = self.load_store();
        store.insert(
            key.clone(),
            ScalarEntry {
                cache_meta: meta,
                data,
            },
        );
        if let Err(e) = self.save_store(&store) {
            warn!(
                domain = self.domain,
                key,
                error = %e,
                "Failed to write scalar cache, continuing without it"
            );
        } else {
            debug!(domain = self.domain, key, "Saved scalar cache entry");
        }
    }

    /// Clear cached entries. Dispatch:
    /// - `(Some(kind), Some(sub_key))`: that entry
    /// - `(Some(kind), None)`: all entries of that type
    /// - `(None, _)`: the entire store
    pub fn clear_cache(&self, kind: Option<ScalarKind>, sub_key: Option<&str>) {
        match kind {
            None => {
                if self.path.exists() {
                    if let Err(e) = fs::remove_file(&self.path) {
                        warn!(domain = self.domain, error = %e, "Failed to remove scalar cache file");
                    } else {
                        info!(domain = self.domain, "Cleared scalar cache");
                    }
                }
            }
            Some(kind) => {
                let mut store = self.load_store();
                let before = store.len();
                match sub_key {
                    Some(sub) => {
                        store.remove(&Self::entry_key(kind, Some(sub)));
                    }
                    None => {
                        let prefix = format!("{}_", kind.as_str());
                        store.retain(|key, _| key != kind.as_str() && !key.starts_with(&prefix));
                    }
                }
                let removed = before - store.len();
                if removed > 0 {
                    if let Err(e) = self.save_store(&store) {
                        warn!(domain = self.domain, error = %e, "Failed to persist scalar cache clear");
                    } else {
                        info!(
                            domain = self.domain,
                            data_type = kind.as_str(),
                            removed,
                            "Cleared scalar cache entries"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache() -> (TempDir, ScalarCache) {
        let dir = TempDir::new().unwrap();
        let cache = ScalarCache::market(dir.path());
        (dir, cache)
    }

    /// Write an entry whose timestamp lies `minutes_ago` in the past
    fn save_backdated(cache: &ScalarCache, kind: ScalarKind, minutes_ago: i64, data: Value) {
        let written = now_naive() - Duration::minutes(minutes_ago);
        let meta = CacheMeta {
            timestamp: written.format(DATETIME_FORMAT).to_string(),
            data_type: kind.as_str().to_string(),
            expire_minutes: kind.expire_minutes(),
            analysis_type: None,
            user_opinion: None,
            user_position: None,
            extra: BTreeMap::new(),
        };
        cache.save_entry(ScalarCache::entry_key(kind, None), meta, data);
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, cache) = cache();
        let payload = json!({"sentiment_score": 62.5, "up_count": 2400});
        cache.save_cached_data(ScalarKind::MarketSentiment, None, payload.clone());

        assert!(cache.is_cache_valid(ScalarKind::MarketSentiment, None));
        assert_eq!(
            cache.get_cached_data(ScalarKind::MarketSentiment, None),
            Some(payload)
        );
    }

    #[test]
    fn test_missing_entry_invalid() {
        let (_dir, cache) = cache();
        assert!(!cache.is_cache_valid(ScalarKind::Valuation, None));
        assert!(cache.get_cached_data(ScalarKind::Valuation, None).is_none());
    }

    #[test]
    fn test_ttl_boundary() {
        let (_dir, cache) = cache();
        let expire = ScalarKind::MarketSentiment.expire_minutes();

        save_backdated(&cache, ScalarKind::MarketSentiment, expire - 1, json!({"v": 1}));
        assert!(cache.is_cache_valid(ScalarKind::MarketSentiment, None));

        save_backdated(&cache, ScalarKind::MarketSentiment, expire + 1, json!({"v": 2}));
        assert!(!cache.is_cache_valid(ScalarKind::MarketSentiment, None));
        // Stale payload still readable as a fallback
        assert_eq!(
            cache.get_cached_data(ScalarKind::MarketSentiment, None),
            Some(json!({"v": 2}))
        );
    }

    #[test]
    fn test_sub_keys_are_independent() {
        let (_dir, cache) = cache();
        cache.save_cached_data(ScalarKind::Valuation, Some("sh000300"), json!({"pe": 12.1}));
        cache.save_cached_data(ScalarKind::Valuation, Some("sh000905"), json!({"pe": 28.4}));

        assert_eq!(
            cache.get_cached_data(ScalarKind::Valuation, Some("sh000300")),
            Some(json!({"pe": 12.1}))
        );
        assert_eq!(
            cache.get_cached_data(ScalarKind::Valuation, Some("sh000905")),
            Some(json!({"pe": 28.4}))
        );
    }

    #[test]
    fn test_analysis_subtype_ttl_override() {
        let dir = TempDir::new().unwrap();
        let cache = ScalarCache::stock(dir.path());

        // Technical analysis TTL is 60 minutes, tighter than the generic 180.
        // Backdate 90 minutes: generic would be valid, sub-type is not.
        let written = now_naive() - Duration::minutes(90);
        let meta = CacheMeta {
            timestamp: written.format(DATETIME_FORMAT).to_string(),
            data_type: ScalarKind::AiAnalysis.as_str().to_string(),
            expire_minutes: ScalarKind::AiAnalysis.expire_minutes(),
            analysis_type: Some(AnalysisKind::Technical.as_str().to_string()),
            user_opinion: None,
            user_position: None,
            extra: BTreeMap::new(),
        };
        let key = ScalarCache::entry_key(
            ScalarKind::AiAnalysis,
            Some(&ScalarCache::analysis_sub_key("600300", AnalysisKind::Technical)),
        );
        cache.save_entry(key, meta, json!({"content": "..."}));

        assert!(!cache.is_analysis_valid("600300", AnalysisKind::Technical, None, None));

        // Chip analysis TTL is 720 minutes, looser than the generic 180
        let written = now_naive() - Duration::minutes(300);
        let meta = CacheMeta {
            timestamp: written.format(DATETIME_FORMAT).to_string(),
            data_type: ScalarKind::AiAnalysis.as_str().to_string(),
            expire_minutes: ScalarKind::AiAnalysis.expire_minutes(),
            analysis_type: Some(AnalysisKind::Chip.as_str().to_string()),
            user_opinion: None,
            user_position: None,
            extra: BTreeMap::new(),
        };
        let key = ScalarCache::entry_key(
            ScalarKind::AiAnalysis,
            Some(&ScalarCache::analysis_sub_key("600300", AnalysisKind::Chip)),
        );
        cache.save_entry(key, meta, json!({"content": "..."}));

        assert!(cache.is_analysis_valid("600300", AnalysisKind::Chip, None, None));
    }

    #[test]
    fn test_comprehensive_opinion_sensitivity() {
        let dir = TempDir::new().unwrap();
        let cache = ScalarCache::stock(dir.path());

        cache.save_analysis(
            "600300",
            AnalysisKind::Comprehensive,
            Some("bullish on fundamentals"),
            Some("holding 30%"),
            json!({"content": "report"}),
        );

        // Matching inputs: valid within TTL
        assert!(cache.is_analysis_valid(
            "600300",
            AnalysisKind::Comprehensive,
            Some("bullish on fundamentals"),
            Some("holding 30%"),
        ));
        // Changed opinion: invalid even though the TTL has not expired
        assert!(!cache.is_analysis_valid(
            "600300",
            AnalysisKind::Comprehensive,
            Some("turning bearish"),
            Some("holding 30%"),
        ));
        // Changed position: same
        assert!(!cache.is_analysis_valid(
            "600300",
            AnalysisKind::Comprehensive,
            Some("bullish on fundamentals"),
            Some("sold out"),
        ));
        // Inputs only matter for the comprehensive entry
        cache.save_analysis("600300", AnalysisKind::News, None, None, json!({"content": "n"}));
        assert!(cache.is_analysis_valid("600300", AnalysisKind::News, Some("anything"), None));
    }

    #[test]
    fn test_nan_sanitized_to_null() {
        let (dir, cache) = cache();
        let payload = json!({
            "pe": serde_json::to_value(f64::NAN).unwrap(),
            "pb": 1.4,
        });
        cache.save_cached_data(ScalarKind::Valuation, None, payload);

        let raw = fs::read_to_string(dir.path().join(MARKET_CACHE_FILE)).unwrap();
        assert!(raw.contains("\"pe\": null"));

        let loaded = cache.get_cached_data(ScalarKind::Valuation, None).unwrap();
        assert!(loaded["pe"].is_null());
        assert_eq!(loaded["pb"], json!(1.4));
    }

    #[test]
    fn test_corrupt_store_treated_as_empty() {
        let (dir, cache) = cache();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join(MARKET_CACHE_FILE), b"{not json").unwrap();

        assert!(!cache.is_cache_valid(ScalarKind::MarketSentiment, None));
        // A save after corruption starts from an empty store
        cache.save_cached_data(ScalarKind::MarketSentiment, None, json!({"v": 1}));
        assert!(cache.is_cache_valid(ScalarKind::MarketSentiment, None));
    }

    #[test]
    fn test_clear_dispatch() {
        let (_dir, cache) = cache();
        cache.save_cached_data(ScalarKind::Valuation, Some("sh000300"), json!({"pe": 12.1}));
        cache.save_cached_data(ScalarKind::Valuation, Some("sh000905"), json!({"pe": 28.4}));
        cache.save_cached_data(ScalarKind::MarketSentiment, None, json!({"v": 1}));

        // Specific entry
        cache.clear_cache(Some(ScalarKind::Valuation), Some("sh000300"));
        assert!(cache.get_cached_data(ScalarKind::Valuation, Some("sh000300")).is_none());
        assert!(cache.get_cached_data(ScalarKind::Valuation, Some("sh000905")).is_some());

        // All entries of a type
        cache.clear_cache(Some(ScalarKind::Valuation), None);
        assert!(cache.get_cached_data(ScalarKind::Valuation, Some("sh000905")).is_none());
        assert!(cache.get_cached_data(ScalarKind::MarketSentiment, None).is_some());

        // Entire store
        cache.clear_cache(None, None);
        assert!(cache.get_cached_data(ScalarKind::MarketSentiment, None).is_none());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_typed_round_trip() {
        let (_dir, cache) = cache();
        let snapshot = crate::models::SentimentSnapshot {
            up_count: 2400,
            down_count: 1800,
            flat_count: 300,
            limit_up_count: 45,
            limit_down_count: 12,
            sentiment_score: 62.5,
            extra: None,
        };
        cache.save_cached(ScalarKind::MarketSentiment, None, &snapshot);

        let loaded: crate::models::SentimentSnapshot = cache
            .get_cached(ScalarKind::MarketSentiment, None)
            .unwrap();
        assert_eq!(loaded.up_count, 2400);
        assert_eq!(loaded.sentiment_score, 62.5);
    }
}
