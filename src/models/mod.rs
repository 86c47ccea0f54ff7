mod candle;
mod granularity;
mod scalar;

pub use candle::{CandleRecord, DataType};
pub use granularity::Granularity;
pub use scalar::{AnalysisKind, AnalysisResult, ScalarKind, SentimentSnapshot, ValuationSnapshot};

/// Candle series for a single symbol, ascending by timestamp
pub type CandleSeries = Vec<CandleRecord>;
