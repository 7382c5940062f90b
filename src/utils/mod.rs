//! Utility modules for index construction
//!
//! Contains shared functionality used across multiple stages:
//! - LazyFrame helpers: Safe materialization with column validation
//! - Geo keys: FIPS parsing across inconsistent sources
//! - Response codes: Typed "code = label" parsing for the question guide

pub mod lazy_helpers;
pub mod geo_keys;
pub mod response_codes;

// Re-export commonly used types
pub use lazy_helpers::{
    column_as_f64, column_as_f64_complete, column_as_state, materialize_with_columns,
    require_columns,
};
pub use geo_keys::{parse_fips, StateCode};
pub use response_codes::ResponseCodes;
