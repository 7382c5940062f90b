//! Sub-indicator normalization with theoretical bounds
//!
//! Bounds come from the respondent-level harmonized table, not from the
//! aggregated series: min = mean over variables of each variable's column
//! minimum, max likewise. Normalized values are not clamped, so a state can
//! land slightly outside [0, 1] when its weighted means exceed the averaged
//! extremes.

use tracing::debug;

use super::{HarmonizedTable, StateAggregate, SubIndicator};
use crate::error::{PipelineError, Result};
use crate::utils::column_as_f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TheoreticalBounds {
    pub min: f64,
    pub max: f64,
}

impl TheoreticalBounds {
    /// Average of per-variable minima and maxima on the ungrouped table
    pub fn from_table(table: &HarmonizedTable) -> Result<Self> {
        let context = format!("{} {} bounds", table.year, table.theme);
        let mut mins = Vec::with_capacity(table.variables.len());
        let mut maxs = Vec::with_capacity(table.variables.len());

        for name in &table.variables {
            let values: Vec<f64> = column_as_f64(table.frame(), name, &context)?
                .into_iter()
                .flatten()
                .collect();
            if values.is_empty() {
                continue;
            }
            mins.push(values.iter().copied().fold(f64::INFINITY, f64::min));
            maxs.push(values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        }

        if mins.is_empty() {
            return Err(PipelineError::DegenerateBounds { context, value: f64::NAN });
        }

        let bounds = Self {
            min: mins.iter().sum::<f64>() / mins.len() as f64,
            max: maxs.iter().sum::<f64>() / maxs.len() as f64,
        };
        if bounds.max == bounds.min {
            return Err(PipelineError::DegenerateBounds {
                context,
                value: bounds.min,
            });
        }
        Ok(bounds)
    }

    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

/// Rescale an aggregate's row-mean column into a sub-indicator
pub fn normalize_sub_indicator(aggregate: &StateAggregate, bounds: TheoreticalBounds) -> Result<SubIndicator> {
    let states = aggregate.states()?;
    let raw = aggregate.raw_sub_indicator()?;

    let series: SubIndicator = states
        .into_iter()
        .zip(raw)
        .map(|(state, value)| (state, bounds.normalize(value)))
        .collect();

    debug!(year = aggregate.year, min = bounds.min, max = bounds.max, states = series.len(), "Normalized sub-indicator");
    Ok(series)
}
