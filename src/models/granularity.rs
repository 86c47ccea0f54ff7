use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of a candle series.
///
/// Closed set; each variant owns exactly one backing cache file.
/// `IndexDaily` is kept apart from `Day1` because index series are fetched
/// and merged independently from equity series, and index symbols can
/// collide with stock codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// 1-minute candles
    Min1,
    /// 5-minute candles
    Min5,
    /// 15-minute candles
    Min15,
    /// 30-minute candles
    Min30,
    /// 60-minute candles
    Min60,
    /// 1-hour candles (provider alias of 60-minute, separate store)
    Hour1,
    /// Daily candles
    Day1,
    /// Weekly candles
    Week1,
    /// Monthly candles
    Month1,
    /// Daily index candles
    IndexDaily,
}

impl Granularity {
    /// String form used in file names and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Min1 => "1m",
            Granularity::Min5 => "5m",
            Granularity::Min15 => "15m",
            Granularity::Min30 => "30m",
            Granularity::Min60 => "60m",
            Granularity::Hour1 => "1h",
            Granularity::Day1 => "1d",
            Granularity::Week1 => "1w",
            Granularity::Month1 => "1M",
            Granularity::IndexDaily => "index_1d",
        }
    }

    /// Parse the string form back into a granularity
    pub fn parse(s: &str) -> Option<Granularity> {
        match s {
            "1m" => Some(Granularity::Min1),
            "5m" => Some(Granularity::Min5),
            "15m" => Some(Granularity::Min15),
            "30m" => Some(Granularity::Min30),
            "60m" => Some(Granularity::Min60),
            "1h" => Some(Granularity::Hour1),
            "1d" => Some(Granularity::Day1),
            "1w" => Some(Granularity::Week1),
            "1M" => Some(Granularity::Month1),
            "index_1d" => Some(Granularity::IndexDaily),
            _ => None,
        }
    }

    /// Name of the backing CSV file for this granularity
    pub fn file_name(&self) -> String {
        format!("kline_{}.csv", self.as_str())
    }

    /// Intraday granularities carry full datetimes; daily and coarser
    /// carry dates only
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Granularity::Min1
                | Granularity::Min5
                | Granularity::Min15
                | Granularity::Min30
                | Granularity::Min60
                | Granularity::Hour1
        )
    }

    /// Nominal duration of one candle bucket, used to estimate how far back
    /// a missing-range fetch must reach
    pub fn period(&self) -> Duration {
        match self {
            Granularity::Min1 => Duration::minutes(1),
            Granularity::Min5 => Duration::minutes(5),
            Granularity::Min15 => Duration::minutes(15),
            Granularity::Min30 => Duration::minutes(30),
            Granularity::Min60 | Granularity::Hour1 => Duration::hours(1),
            Granularity::Day1 | Granularity::IndexDaily => Duration::days(1),
            Granularity::Week1 => Duration::days(7),
            Granularity::Month1 => Duration::days(30),
        }
    }

    /// How long a current-period record stays fresh after being fetched.
    ///
    /// Only applies to records that escaped the historical short-circuit,
    /// i.e. today's (or the current bucket's) still-changing candle.
    pub fn freshness_ttl(&self) -> Duration {
        match self {
            Granularity::Min1 => Duration::minutes(1),
            Granularity::Min5 => Duration::minutes(5),
            Granularity::Min15 => Duration::minutes(15),
            Granularity::Min30 => Duration::minutes(30),
            Granularity::Min60 | Granularity::Hour1 => Duration::hours(1),
            Granularity::Day1 | Granularity::IndexDaily => Duration::hours(4),
            Granularity::Week1 | Granularity::Month1 => Duration::days(1),
        }
    }

    /// All supported granularities
    pub fn all() -> Vec<Granularity> {
        vec![
            Granularity::Min1,
            Granularity::Min5,
            Granularity::Min15,
            Granularity::Min30,
            Granularity::Min60,
            Granularity::Hour1,
            Granularity::Day1,
            Granularity::Week1,
            Granularity::Month1,
            Granularity::IndexDaily,
        ]
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Day1
    }
}
