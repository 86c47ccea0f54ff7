//! Flat-file store for candle records.
//!
//! One CSV per granularity holds every symbol's records for that
//! granularity, keyed by (symbol, timestamp). Reads tolerate missing or
//! corrupt files by returning an empty table; writes go through a temp
//! file and rename so a crash never leaves a half-written store.

use crate::error::Result;
use crate::models::{CandleRecord, Granularity};
use crate::services::freshness::is_fresh;
use crate::utils::write_atomic;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct KlineStore {
    cache_dir: PathBuf,
}

impl KlineStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the backing file for a granularity
    pub fn file_path(&self, granularity: Granularity) -> PathBuf {
        self.cache_dir.join(granularity.file_name())
    }

    /// Load the entire table for a granularity.
    ///
    /// Absent or unreadable files yield an empty table; row-level parse
    /// failures skip the row. Never raises: the worst case is a refetch.
    pub fn load_all(&self, granularity: Granularity) -> Vec<CandleRecord> {
        match self.read_file(granularity) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    granularity = %granularity,
                    error = %e,
                    "Failed to load kline cache file, treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn read_file(&self, granularity: Granularity) -> Result<Vec<CandleRecord>> {
        let path = self.file_path(granularity);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for result in reader.deserialize::<CandleRecord>() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    debug!(
                        granularity = %granularity,
                        error = %e,
                        "Skipping unparseable cache row"
                    );
                }
            }
        }
        if skipped > 0 {
            warn!(
                granularity = %granularity,
                skipped,
                kept = records.len(),
                "Dropped unparseable rows while loading kline cache"
            );
        }
        Ok(records)
    }

    /// Overwrite the backing file from the in-memory table, atomically
    pub fn save_all(&self, granularity: Granularity, records: &[CandleRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::CacheError::Io(e.to_string()))?;
        write_atomic(&self.file_path(granularity), &bytes)?;
        debug!(
            granularity = %granularity,
            records = records.len(),
            "Saved kline cache file"
        );
        Ok(())
    }

    /// Fresh records for one symbol, ascending by timestamp, last `count`.
    ///
    /// Returns `None` when nothing fresh remains; callers treat that as
    /// "no usable cache" and fetch. A short result (fewer than `count`)
    /// is returned as-is; topping it up is the cache manager's job.
    pub fn get(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
        now: NaiveDateTime,
    ) -> Option<Vec<CandleRecord>> {
        let mut records: Vec<CandleRecord> = self
            .load_all(granularity)
            .into_iter()
            .filter(|r| r.symbol == symbol)
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let total = records.len();
        records.retain(|r| is_fresh(&r.timestamp, &r.fetch_time, granularity, now));
        debug!(
            symbol,
            granularity = %granularity,
            total,
            fresh = records.len(),
            "Filtered cached kline records by freshness"
        );

        if records.is_empty() {
            return None;
        }
        if records.len() > count {
            records.drain(..records.len() - count);
        }
        Some(records)
    }

    /// All records for one symbol regardless of freshness, ascending,
    /// last `count`. This is the stale-fallback read path.
    pub fn get_ignoring_freshness(
        &self,
        symbol: &str,
        granularity: Granularity,
        count: usize,
    ) -> Vec<CandleRecord> {
        let mut records: Vec<CandleRecord> = self
            .load_all(granularity)
            .into_iter()
            .filter(|r| r.symbol == symbol)
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if records.len() > count {
            records.drain(..records.len() - count);
        }
        records
    }

    /// Drop all existing rows for `symbol` and append `records`
    pub fn replace_symbol(
        &self,
        symbol: &str,
        granularity: Granularity,
        records: Vec<CandleRecord>,
    ) -> Result<()> {
        let mut table = self.load_all(granularity);
        table.retain(|r| r.symbol != symbol);
        table.extend(records);
        Self::sort_table(&mut table);
        self.save_all(granularity, &table)
    }

    /// Upsert `records` by (symbol, timestamp); the incoming value wins
    pub fn merge_symbol(
        &self,
        symbol: &str,
        granularity: Granularity,
        records: Vec<CandleRecord>,
    ) -> Result<()> {
        let mut table = self.load_all(granularity);

        let incoming: HashSet<&str> = records.iter().map(|r| r.timestamp.as_str()).collect();
        table.retain(|r| r.symbol != symbol || !incoming.contains(r.timestamp.as_str()));
        table.extend(records);
        Self::sort_table(&mut table);
        self.save_all(granularity, &table)
    }

    /// Remove one symbol's rows; returns how many were removed
    pub fn remove_symbol(&self, symbol: &str, granularity: Granularity) -> Result<usize> {
        let mut table = self.load_all(granularity);
        let before = table.len();
        table.retain(|r| r.symbol != symbol);
        let removed = before - table.len();
        if removed > 0 {
            self.save_all(granularity, &table)?;
        }
        Ok(removed)
    }

    /// Delete the backing file for a granularity
    pub fn remove_file(&self, granularity: Granularity) -> Result<()> {
        let path = self.file_path(granularity);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!(granularity = %granularity, "Removed kline cache file");
        }
        Ok(())
    }

    // Sorted by symbol then timestamp for readability; correctness only
    // needs per-symbol timestamp uniqueness.
    fn sort_table(table: &mut [CandleRecord]) {
        table.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use crate::utils::now_string;
    use tempfile::TempDir;

    fn store() -> (TempDir, KlineStore) {
        let dir = TempDir::new().unwrap();
        let store = KlineStore::new(dir.path());
        (dir, store)
    }

    fn candle(symbol: &str, date: &str, close: f64) -> CandleRecord {
        CandleRecord::new(
            symbol,
            date,
            close,
            close + 0.5,
            close - 0.5,
            close,
            1000,
            Some(close * 1000.0),
            DataType::Stock,
        )
        .unwrap()
    }

    #[test]
    fn test_load_all_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_all(Granularity::Day1).is_empty());
    }

    #[test]
    fn test_load_all_corrupt_file_is_empty() {
        let (dir, store) = store();
        fs::write(
            dir.path().join(Granularity::Day1.file_name()),
            b"\xff\xfe not a csv at all",
        )
        .unwrap();
        // Header row is garbage, so no rows deserialize
        assert!(store.load_all(Granularity::Day1).is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = store();
        let records = vec![candle("600300", "2025-06-09", 10.0), candle("600300", "2025-06-10", 10.2)];
        store.save_all(Granularity::Day1, &records).unwrap();

        let loaded = store.load_all(Granularity::Day1);
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_round_trip_preserves_empty_amount() {
        let (dir, store) = store();
        let mut record = candle("600300", "2025-06-09", 10.0);
        record.amount = None;
        store.save_all(Granularity::Day1, &[record.clone()]).unwrap();

        let raw = fs::read_to_string(dir.path().join(Granularity::Day1.file_name())).unwrap();
        let header: Vec<&str> = raw.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), crate::constants::KLINE_CSV_COLUMNS);
        assert_eq!(header[crate::constants::csv_column::SYMBOL], "symbol");
        assert_eq!(header[crate::constants::csv_column::DATETIME], "datetime");
        assert_eq!(header[crate::constants::csv_column::AMOUNT], "amount");
        assert_eq!(header[crate::constants::csv_column::FETCH_TIME], "fetch_time");
        assert_eq!(header[crate::constants::csv_column::DATA_TYPE], "data_type");

        let loaded = store.load_all(Granularity::Day1);
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_get_filters_symbol_and_orders() {
        let (_dir, store) = store();
        store
            .save_all(
                Granularity::Day1,
                &[
                    candle("000001", "2025-06-09", 5.0),
                    candle("600300", "2025-06-10", 10.2),
                    candle("600300", "2025-06-09", 10.0),
                ],
            )
            .unwrap();

        let now = crate::utils::now_naive();
        let got = store.get("600300", Granularity::Day1, 10, now).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].timestamp, "2025-06-09");
        assert_eq!(got[1].timestamp, "2025-06-10");
    }

    #[test]
    fn test_get_returns_none_when_nothing_fresh() {
        let (_dir, store) = store();
        let now = crate::utils::now_naive();
        // Today's candle with a fetch 6 hours old: stale under the 4h TTL
        let today = now.format("%Y-%m-%d").to_string();
        let stale_fetch = (now - chrono::Duration::hours(6))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let record = candle("600300", &today, 10.0).with_fetch_time(stale_fetch);
        store.save_all(Granularity::Day1, &[record]).unwrap();

        assert!(store.get("600300", Granularity::Day1, 10, now).is_none());
        // The fallback path still serves it
        let stale = store.get_ignoring_freshness("600300", Granularity::Day1, 10);
        assert_eq!(stale.len(), 1);
    }

    #[test]
    fn test_get_takes_last_count() {
        let (_dir, store) = store();
        let records: Vec<_> = (1..=9)
            .map(|d| candle("600300", &format!("2025-06-0{}", d), 10.0 + d as f64))
            .collect();
        store.save_all(Granularity::Day1, &records).unwrap();

        let now = crate::utils::now_naive();
        let got = store.get("600300", Granularity::Day1, 3, now).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].timestamp, "2025-06-07");
        assert_eq!(got[2].timestamp, "2025-06-09");
    }

    #[test]
    fn test_replace_symbol_drops_prior_range() {
        let (_dir, store) = store();
        store
            .save_all(
                Granularity::Day1,
                &[
                    candle("600300", "2025-06-01", 9.0),
                    candle("000001", "2025-06-01", 5.0),
                ],
            )
            .unwrap();

        store
            .replace_symbol(
                "600300",
                Granularity::Day1,
                vec![candle("600300", "2025-06-09", 10.0)],
            )
            .unwrap();

        let table = store.load_all(Granularity::Day1);
        let symbols: Vec<_> = table.iter().map(|r| (r.symbol.as_str(), r.timestamp.as_str())).collect();
        // Old 600300 row gone even though the new set covers a different range,
        // other symbols untouched
        assert_eq!(symbols, vec![("000001", "2025-06-01"), ("600300", "2025-06-09")]);
    }

    #[test]
    fn test_merge_symbol_upserts_and_preserves() {
        let (_dir, store) = store();
        store
            .save_all(
                Granularity::Day1,
                &[
                    candle("600300", "2025-06-08", 9.5),
                    candle("600300", "2025-06-09", 10.0),
                ],
            )
            .unwrap();

        store
            .merge_symbol(
                "600300",
                Granularity::Day1,
                vec![
                    candle("600300", "2025-06-09", 10.1), // supersedes
                    candle("600300", "2025-06-10", 10.2), // new
                ],
            )
            .unwrap();

        let table = store.load_all(Granularity::Day1);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].timestamp, "2025-06-08");
        assert_eq!(table[1].timestamp, "2025-06-09");
        assert_eq!(table[1].close, 10.1); // new value won
        assert_eq!(table[2].timestamp, "2025-06-10");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (_dir, store) = store();
        let records = vec![
            candle("600300", "2025-06-09", 10.0).with_fetch_time(now_string()),
            candle("600300", "2025-06-10", 10.2).with_fetch_time(now_string()),
        ];
        store
            .merge_symbol("600300", Granularity::Day1, records.clone())
            .unwrap();
        let first = store.load_all(Granularity::Day1);
        store
            .merge_symbol("600300", Granularity::Day1, records)
            .unwrap();
        let second = store.load_all(Granularity::Day1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_day1_and_index_daily_do_not_mix() {
        let (_dir, store) = store();
        store
            .replace_symbol(
                "600300",
                Granularity::Day1,
                vec![candle("600300", "2025-06-09", 10.0)],
            )
            .unwrap();
        store
            .replace_symbol(
                "600300",
                Granularity::IndexDaily,
                vec![candle("600300", "2025-06-09", 3000.0)],
            )
            .unwrap();

        assert_eq!(store.load_all(Granularity::Day1).len(), 1);
        assert_eq!(store.load_all(Granularity::IndexDaily).len(), 1);
        assert_eq!(store.load_all(Granularity::Day1)[0].close, 10.0);
        assert_eq!(store.load_all(Granularity::IndexDaily)[0].close, 3000.0);
    }
}
