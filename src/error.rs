//! Error taxonomy for the forecast pipeline

use thiserror::Error;

use crate::models::VisitorType;

/// Fatal precondition failures raised by the pipeline stages.
///
/// Per-site ratio gaps are not errors; see [`crate::sites::RatioCoverageGap`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Too few annual periods to estimate a trend
    #[error("Insufficient data for {key}: need at least {required} periods, got {actual}")]
    InsufficientData {
        key: VisitorType,
        required: usize,
        actual: usize,
    },

    /// Seasonal window too short, or the decomposition is unusable
    #[error("Decomposition failed: need at least {required} months, got {actual}")]
    Decomposition { required: usize, actual: usize },

    /// Seasonal decomposition produced values that cannot form an index
    #[error("Decomposition produced an unusable seasonal basis: {0}")]
    DegenerateSeasonal(String),

    #[error("No stay duration configured for {0}")]
    MissingStayDuration(VisitorType),

    #[error("Stay duration for {key} must be positive, got {value}")]
    InvalidStayDuration { key: VisitorType, value: f64 },

    /// A region/metric filter matched zero rows
    #[error("Filter matched no rows: {filter}")]
    FilterMatch { filter: String },

    /// Missing or duplicated period in a series that must be contiguous
    #[error("Series '{series}' is not contiguous: {detail}")]
    SeriesGap { series: String, detail: String },

    #[error("Table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Table '{table}', column '{column}', row {row}: cannot read '{value}'")]
    Coercion {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    #[error("Ratio for site '{site}' must lie in [0, 1], got {ratio}")]
    InvalidRatio { site: String, ratio: f64 },

    #[error("Site ratios sum to {sum}, which exceeds 1")]
    RatioSumExceeded { sum: f64 },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ForecastError>;
