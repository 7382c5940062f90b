//! Weighted state aggregation
//!
//! Collapses respondent rows into one survey-weighted mean per state per
//! variable: `sum(x * w) / sum(w)`.

use polars::prelude::*;
use tracing::debug;

use super::HarmonizedTable;
use crate::data::Year;
use crate::error::{PipelineError, Result};
use crate::utils::{column_as_f64, column_as_f64_complete, column_as_state, StateCode};

pub const SUB_INDICATOR_COLUMN: &str = "sub_indicator";
const WEIGHT_SUM_COLUMN: &str = "__weight_sum";

/// One row per state: weighted means, then the row-mean sub-indicator
#[derive(Debug, Clone)]
pub struct StateAggregate {
    pub year: Year,
    pub state_column: String,
    frame: DataFrame,
}

impl StateAggregate {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn states(&self) -> Result<Vec<StateCode>> {
        column_as_state(&self.frame, &self.state_column, "state aggregate")
    }

    /// Unnormalized row mean of the theme variables, per state
    pub fn raw_sub_indicator(&self) -> Result<Vec<f64>> {
        column_as_f64_complete(&self.frame, SUB_INDICATOR_COLUMN, "state aggregate")
    }
}

/// Weighted mean per state
///
/// # Errors
/// `ZeroWeightSum` when a state's weights add up to zero.
pub fn aggregate_by_state(table: &HarmonizedTable) -> Result<StateAggregate> {
    let state = table.state_column.as_str();
    let weight = table.weight_column.as_str();

    let mut aggs: Vec<Expr> = table
        .variables
        .iter()
        .map(|v| ((col(v.as_str()) * col(weight)).sum() / col(weight).sum()).alias(v.as_str()))
        .collect();
    aggs.push(col(weight).sum().alias(WEIGHT_SUM_COLUMN));

    let grouped = table
        .frame()
        .clone()
        .lazy()
        .group_by([col(state)])
        .agg(aggs)
        .sort([state], Default::default())
        .collect()?;

    let states = column_as_state(&grouped, state, "state aggregate")?;
    let weight_sums = column_as_f64(&grouped, WEIGHT_SUM_COLUMN, "state aggregate")?;
    for (s, w) in states.iter().zip(&weight_sums) {
        if w.map_or(true, |w| w == 0.0) {
            return Err(PipelineError::ZeroWeightSum {
                year: table.year,
                state: *s,
            });
        }
    }

    let means: Vec<Vec<Option<f64>>> = table
        .variables
        .iter()
        .map(|v| column_as_f64(&grouped, v, "state aggregate"))
        .collect::<Result<_>>()?;
    let row_means: Vec<Option<f64>> = (0..grouped.height())
        .map(|r| {
            let row: Vec<f64> = means.iter().filter_map(|c| c[r]).collect();
            (!row.is_empty()).then(|| row.iter().sum::<f64>() / row.len() as f64)
        })
        .collect();

    let mut frame = grouped.drop(WEIGHT_SUM_COLUMN)?;
    frame.with_column(Column::new(SUB_INDICATOR_COLUMN.into(), row_means))?;

    debug!(year = table.year, theme = %table.theme, states = frame.height(), "Aggregated by state");
    Ok(StateAggregate {
        year: table.year,
        state_column: table.state_column.clone(),
        frame,
    })
}
