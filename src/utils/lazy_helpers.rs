//! LazyFrame materialization helpers with column validation
//!
//! Provides safe, explicit patterns for pulling survey and panel columns out
//! of Polars frames so that a missing column surfaces as a
//! [`PipelineError::MissingColumn`] naming the stage, rather than a bare
//! Polars "not found".

use polars::prelude::*;
use rustc_hash::FxHashSet;

use crate::error::{PipelineError, Result};

/// Check that every column in `columns` exists in `df`
///
/// # Errors
/// Returns `MissingColumn` for the first absent column, tagged with `context`
/// (e.g. "2023 health harmonizer").
pub fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    let actual: FxHashSet<&str> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.as_str())
        .collect();

    for &expected in columns {
        if !actual.contains(expected) {
            return Err(PipelineError::MissingColumn {
                context: context.to_string(),
                column: expected.to_string(),
            });
        }
    }
    Ok(())
}

/// Materialize LazyFrame with explicit column list and validation
///
/// # Arguments
/// * `lazy` - LazyFrame to materialize
/// * `columns` - Required column names
/// * `context` - Context for error messages (e.g., "2022 micro_eco")
///
/// # Returns
/// DataFrame with exactly the specified columns, in the given order
pub fn materialize_with_columns(
    lazy: &LazyFrame,
    columns: &[&str],
    context: &str,
) -> Result<DataFrame> {
    let schema_df = lazy.clone().limit(0).collect()?;
    require_columns(&schema_df, columns, context)?;

    let col_exprs: Vec<Expr> = columns.iter().map(|&name| col(name)).collect();
    let df = lazy.clone().select(&col_exprs).collect()?;
    Ok(df)
}

/// Read a column as `f64` values, with nulls and NaNs both mapped to `None`
///
/// Survey files decoded from SAS carry missing codes as NaN, parquet snapshots
/// carry them as null; downstream stages treat the two the same.
pub fn column_as_f64(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name).map_err(|_| PipelineError::MissingColumn {
        context: context.to_string(),
        column: name.to_string(),
    })?;
    let casted = column.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Same as [`column_as_f64`] but fails if any value is missing
pub fn column_as_f64_complete(df: &DataFrame, name: &str, context: &str) -> Result<Vec<f64>> {
    column_as_f64(df, name, context)?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| PipelineError::MissingColumn {
                context: format!("{context} (null value)"),
                column: name.to_string(),
            })
        })
        .collect()
}

/// Read a state-key column as `u32` FIPS codes
///
/// # Errors
/// `InvalidStateCode` for fractional, negative or out-of-range keys.
pub fn column_as_state(df: &DataFrame, name: &str, context: &str) -> Result<Vec<u32>> {
    column_as_f64_complete(df, name, context)?
        .into_iter()
        .map(|x| {
            if x.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&x) {
                Ok(x as u32)
            } else {
                Err(PipelineError::InvalidStateCode {
                    context: context.to_string(),
                    column: name.to_string(),
                    value: x,
                })
            }
        })
        .collect()
}
