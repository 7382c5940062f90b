//! Child Health Index
//!
//! Composite child health index per U.S. state from NSCH survey microdata,
//! BEA regional GDP and Census state boundaries.
//!
//! - `data`: survey registry, geographic reference, economic panel, question guide
//! - `imputation`: two-pass k-NN imputation and its conformance check
//! - `indicators`: harmonization, weighted state aggregation, normalization,
//!   PCA economic synthesis, geometric-mean composite
//! - `analysis`: ranks, Kendall tau, MCA, correlation matrix
//! - `pipeline`: end-to-end orchestration, sequential or per-year parallel

pub mod error;
pub mod config;
pub mod utils;
pub mod data;
pub mod imputation;
pub mod indicators;
pub mod analysis;
pub mod pipeline;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use config::{PipelineConfig, SurveyColumns};
pub use data::{DatasetRegistry, EconomicPanel, GeoReference, QuestionGuide, Year};
pub use imputation::{check_imputation, SurveyImputer};
pub use indicators::{GlobalHealthIndex, IndicatorKind, SubIndicator, SubIndicatorKey, SubIndicatorStore, Theme, ThemeSpec};
pub use pipeline::{IndexPipeline, PipelineOutput};
