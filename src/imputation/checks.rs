//! Post-imputation conformance check
//!
//! A table that fails here must not reach aggregation: a half-imputed column
//! would silently shrink the weighted means of the states it touches.

use polars::prelude::*;
use tracing::info;

use super::{FormTypes, IMPUTED_SUFFIX};
use crate::config::SurveyColumns;
use crate::data::Year;
use crate::error::{PipelineError, Result};
use crate::utils::{column_as_f64, require_columns};

/// Missing-value percentages after imputation
#[derive(Debug, Clone)]
pub struct ImputationReport {
    pub year: Year,
    /// Worst column outside height/weight, and its missing percentage
    pub max_missing: Option<(String, f64)>,
    /// Height/weight missing percentage among non-baseline rows
    pub anthropometric_missing: Vec<(String, f64)>,
}

impl ImputationReport {
    pub fn is_complete(&self) -> bool {
        self.max_missing.as_ref().map_or(true, |(_, pct)| *pct == 0.0)
            && self.anthropometric_missing.iter().all(|(_, pct)| *pct == 0.0)
    }
}

fn missing_pct(values: &[Option<f64>]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let missing = values.iter().filter(|v| v.is_none()).count();
    100.0 * missing as f64 / values.len() as f64
}

/// Measure missingness of an imputed table without failing
pub fn imputation_report(
    year: Year,
    df: &DataFrame,
    columns: &SurveyColumns,
    baseline_form_code: i64,
) -> Result<ImputationReport> {
    let context = format!("{} imputation check", year);
    let [height_col, weight_col] = &columns.anthropometric;
    require_columns(df, &[columns.form_type.as_str(), height_col.as_str(), weight_col.as_str()], &context)?;

    let mut max_missing: Option<(String, f64)> = None;
    for name in df.get_column_names() {
        let name = name.as_str();
        if name.ends_with(IMPUTED_SUFFIX) || name == height_col || name == weight_col {
            continue;
        }
        let pct = if name == columns.form_type {
            let nulls = df.column(name)?.null_count();
            if df.height() == 0 { 0.0 } else { 100.0 * nulls as f64 / df.height() as f64 }
        } else {
            missing_pct(&column_as_f64(df, name, &context)?)
        };
        if max_missing.as_ref().map_or(true, |(_, worst)| pct > *worst) {
            max_missing = Some((name.to_string(), pct));
        }
    }

    let form_types = FormTypes::parse(df, &columns.form_type, year)?;
    let measured: Vec<bool> = form_types
        .codes
        .iter()
        .map(|c| c.map_or(false, |c| c != baseline_form_code))
        .collect();

    let mut anthropometric_missing = Vec::with_capacity(2);
    for name in [height_col, weight_col] {
        let values: Vec<Option<f64>> = column_as_f64(df, name, &context)?
            .into_iter()
            .zip(&measured)
            .filter(|(_, m)| **m)
            .map(|(v, _)| v)
            .collect();
        anthropometric_missing.push((name.clone(), missing_pct(&values)));
    }

    Ok(ImputationReport {
        year,
        max_missing,
        anthropometric_missing,
    })
}

/// Fail unless the imputed table is complete
///
/// # Errors
/// `ImputationIncomplete` naming the first offending column. The pipeline
/// treats this as fatal.
pub fn check_imputation(
    year: Year,
    df: &DataFrame,
    columns: &SurveyColumns,
    baseline_form_code: i64,
) -> Result<ImputationReport> {
    let report = imputation_report(year, df, columns, baseline_form_code)?;

    if let Some((column, pct)) = &report.max_missing {
        if *pct > 0.0 {
            return Err(PipelineError::ImputationIncomplete {
                year,
                column: column.clone(),
                missing_pct: *pct,
            });
        }
    }
    for (column, pct) in &report.anthropometric_missing {
        if *pct > 0.0 {
            return Err(PipelineError::ImputationIncomplete {
                year,
                column: column.clone(),
                missing_pct: *pct,
            });
        }
    }

    info!(year, "Imputation check passed");
    Ok(report)
}
