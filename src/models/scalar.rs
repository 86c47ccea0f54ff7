use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Data types held by the scalar/blob caches, each with its own TTL.
///
/// These are whole-document caches: a successful fetch overwrites the
/// entry wholesale, there is no per-record freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// Market-wide sentiment snapshot
    MarketSentiment,
    /// Valuation snapshot (PE/PB percentiles etc.)
    Valuation,
    /// North/south money flow; macro data, changes rarely
    MoneyFlow,
    /// Margin trading detail
    MarginDetail,
    /// Current index quotes
    CurrentIndices,
    /// AI-generated analysis text
    AiAnalysis,
    /// Computed technical indicator snapshot
    TechnicalIndicators,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::MarketSentiment => "market_sentiment",
            ScalarKind::Valuation => "valuation",
            ScalarKind::MoneyFlow => "money_flow",
            ScalarKind::MarginDetail => "margin_detail",
            ScalarKind::CurrentIndices => "current_indices",
            ScalarKind::AiAnalysis => "ai_analysis",
            ScalarKind::TechnicalIndicators => "technical_indicators",
        }
    }

    /// TTL in minutes for entries of this type
    pub fn expire_minutes(&self) -> i64 {
        match self {
            ScalarKind::MarketSentiment => 15,
            ScalarKind::Valuation => 1440,
            ScalarKind::MoneyFlow => 43200,
            ScalarKind::MarginDetail => 60,
            ScalarKind::CurrentIndices => 5,
            ScalarKind::AiAnalysis => 180,
            ScalarKind::TechnicalIndicators => 60,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sub-types of per-stock AI analysis, each overriding the generic
/// `ai_analysis` TTL with a finer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Technical,
    Fundamental,
    News,
    Chip,
    Company,
    Comprehensive,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Technical => "technical",
            AnalysisKind::Fundamental => "fundamental",
            AnalysisKind::News => "news",
            AnalysisKind::Chip => "chip",
            AnalysisKind::Company => "company",
            AnalysisKind::Comprehensive => "comprehensive",
        }
    }

    pub fn parse(s: &str) -> Option<AnalysisKind> {
        match s {
            "technical" => Some(AnalysisKind::Technical),
            "fundamental" => Some(AnalysisKind::Fundamental),
            "news" => Some(AnalysisKind::News),
            "chip" => Some(AnalysisKind::Chip),
            "company" => Some(AnalysisKind::Company),
            "comprehensive" => Some(AnalysisKind::Comprehensive),
            _ => None,
        }
    }

    /// TTL in minutes for this analysis sub-type
    pub fn expire_minutes(&self) -> i64 {
        match self {
            AnalysisKind::Technical => 60,
            AnalysisKind::Fundamental => 360,
            AnalysisKind::News => 120,
            AnalysisKind::Chip => 720,
            AnalysisKind::Company => 43200,
            AnalysisKind::Comprehensive => 180,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market-wide sentiment snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// Advancing issues
    pub up_count: u32,
    /// Declining issues
    pub down_count: u32,
    /// Unchanged issues
    pub flat_count: u32,
    /// Limit-up issues
    pub limit_up_count: u32,
    /// Limit-down issues
    pub limit_down_count: u32,
    /// Composite 0-100 sentiment score
    pub sentiment_score: f64,
    /// Free-form provider extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Index valuation snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub index_name: String,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    /// Percentile of current PE within its history, 0-100
    pub pe_percentile: Option<f64>,
    pub pb_percentile: Option<f64>,
}

/// One AI-generated analysis text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub analysis_type: AnalysisKind,
    /// The generated report text (Markdown)
    pub content: String,
    /// Model identifier reported by the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
