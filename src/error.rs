//! Error types for Miya Vitality

use thiserror::Error;

/// Errors that can occur while adapting payloads or loading engine configuration.
///
/// Insufficient data is never an error: scoring returns `None` and the trend
/// engine returns an explicit coverage status instead.
#[derive(Debug, Error)]
pub enum VitalityError {
    #[error("Failed to parse provider payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid benchmark table: {0}")]
    InvalidBenchmark(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
}
