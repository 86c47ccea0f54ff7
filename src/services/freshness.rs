//! Freshness policy for cached candles.
//!
//! The policy is asymmetric on purpose: a candle that is old enough to be
//! settled history is permanently fresh and never refetched, while the
//! current, still-changing candle is only fresh for a granularity-specific
//! TTL after its fetch time. Parse failures degrade to "stale" so a
//! malformed row costs one refetch instead of an error.

use crate::constants::{
    DATETIME_FORMAT, DATE_FORMAT, HISTORICAL_GRACE_DAYS, HISTORICAL_GRACE_SECS,
};
use crate::error::Result;
use crate::models::Granularity;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

/// Parse a record timestamp according to its granularity.
///
/// Daily and coarser candles carry dates, intraday candles carry full
/// datetimes; the other format is accepted as a fallback because provider
/// responses are not always consistent.
pub fn parse_record_timestamp(timestamp: &str, granularity: Granularity) -> Result<NaiveDateTime> {
    if granularity.is_intraday() {
        NaiveDateTime::parse_from_str(timestamp, DATETIME_FORMAT)
            .or_else(|_| {
                NaiveDate::parse_from_str(timestamp, DATE_FORMAT).map(|d| d.and_time(NaiveTime::MIN))
            })
            .map_err(Into::into)
    } else {
        NaiveDate::parse_from_str(timestamp, DATE_FORMAT)
            .map(|d| d.and_time(NaiveTime::MIN))
            .or_else(|_| NaiveDateTime::parse_from_str(timestamp, DATETIME_FORMAT))
            .map_err(Into::into)
    }
}

/// Decide whether a cached record is still authoritative.
///
/// 1. Settled history is always fresh: daily+ candles dated more than
///    `HISTORICAL_GRACE_DAYS` before `now`, intraday candles more than
///    `HISTORICAL_GRACE_SECS` old.
/// 2. A candle fetched on a later calendar day than its own date (daily+),
///    or fetched more than an hour after its bucket (intraday), was not
///    fetched live and is also final.
/// 3. Everything else is the current bucket: fresh iff strictly less than
///    the granularity TTL has elapsed since `fetch_time`.
pub fn is_fresh(
    record_timestamp: &str,
    fetch_time: &str,
    granularity: Granularity,
    now: NaiveDateTime,
) -> bool {
    let record_dt = match parse_record_timestamp(record_timestamp, granularity) {
        Ok(dt) => dt,
        Err(e) => {
            warn!(
                record_timestamp,
                granularity = %granularity,
                error = %e,
                "Unparseable record timestamp, treating as stale"
            );
            return false;
        }
    };

    let fetch_dt = match NaiveDateTime::parse_from_str(fetch_time, DATETIME_FORMAT) {
        Ok(dt) => dt,
        Err(e) => {
            warn!(
                fetch_time,
                granularity = %granularity,
                error = %e,
                "Unparseable fetch time, treating as stale"
            );
            return false;
        }
    };

    if granularity.is_intraday() {
        if now - record_dt > Duration::seconds(HISTORICAL_GRACE_SECS) {
            return true;
        }
        if fetch_dt - record_dt > Duration::seconds(HISTORICAL_GRACE_SECS) {
            return true;
        }
    } else {
        if (now.date() - record_dt.date()).num_days() > HISTORICAL_GRACE_DAYS {
            return true;
        }
        if record_dt.date() != fetch_dt.date() {
            return true;
        }
    }

    now - fetch_dt < granularity.freshness_ttl()
}
