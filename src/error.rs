//! Pipeline error taxonomy
//!
//! Stage functions return [`PipelineError`] so callers can tell a data defect
//! (missing column, failed imputation, zero weights) from an I/O failure.
//! Loaders and binaries wrap these in `anyhow` with context.

use polars::prelude::PolarsError;
use thiserror::Error;

use crate::data::Year;
use crate::indicators::{IndicatorKind, Theme};

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{context}: missing required column '{column}'")]
    MissingColumn { context: String, column: String },

    #[error("year {year}: form type '{value}' in column '{column}' has no numeric code")]
    InvalidFormType {
        year: Year,
        column: String,
        value: String,
    },

    #[error("year {year}: column '{column}' has no observed values to impute from")]
    EmptyColumn { year: Year, column: String },

    #[error("year {year}: column '{column}' still {missing_pct:.4}% missing after imputation")]
    ImputationIncomplete {
        year: Year,
        column: String,
        missing_pct: f64,
    },

    #[error("{context}: '{value}' in column '{column}' is not a state FIPS code")]
    InvalidStateCode {
        context: String,
        column: String,
        value: f64,
    },

    #[error("year {year}: survey weights sum to zero for state {state}")]
    ZeroWeightSum { year: Year, state: u32 },

    #[error("{context}: theoretical bounds are degenerate (min = max = {value})")]
    DegenerateBounds { context: String, value: f64 },

    #[error("{context}: '{column}' has zero variance")]
    DegenerateVariance { context: String, column: String },

    #[error("malformed response code entry '{entry}'")]
    MalformedResponseCode { entry: String },

    #[error("variable '{variable}': no label for response code {code}")]
    UnknownResponseCode { variable: String, code: i64 },

    #[error("unknown theme '{0}' (expected health, mental_health or micro_eco)")]
    UnknownTheme(String),

    #[error("theme '{0}' has no variable list in the configuration")]
    ThemeNotConfigured(Theme),

    #[error("no dataset registered for year {0}")]
    MissingYear(Year),

    #[error("no {kind} sub-indicator for year {year}")]
    MissingSubIndicator { kind: IndicatorKind, year: Year },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}
