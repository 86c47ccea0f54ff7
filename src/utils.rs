use crate::constants::{CACHE_DIR_ENV, DATETIME_FORMAT, DEFAULT_CACHE_DIR};
use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the cache directory from the environment or use the default
pub fn get_cache_dir() -> PathBuf {
    std::env::var(CACHE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR))
}

/// Current wall-clock time without timezone, matching the stored string format
pub fn now_naive() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Format a timestamp the way fetch times are stored
pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Current time in the stored fetch-time format
pub fn now_string() -> String {
    format_datetime(now_naive())
}

/// Write a file atomically: write to a sibling temp file, then rename over
/// the target. A crash mid-write leaves either the old file or the new one,
/// never a half-written target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Recursively replace non-finite floats with null.
///
/// Upstream numeric providers routinely emit NaN/Infinity; JSON has no
/// representation for them, so they are sanitized before persisting.
pub fn sanitize_json(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    *value = Value::Null;
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_json(item);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                sanitize_json(v);
            }
        }
        _ => {}
    }
}
