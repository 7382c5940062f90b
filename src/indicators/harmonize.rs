//! Scale harmonization
//!
//! Recodes one theme's survey variables so that a higher value always means a
//! better outcome. The recoding is not idempotent (a second pass flips the
//! scale back), so [`HarmonizedTable`] can only be built from a raw table.

use polars::prelude::*;
use rustc_hash::FxHashSet;
use tracing::debug;

use super::{Theme, ThemeSpec};
use crate::config::SurveyColumns;
use crate::data::Year;
use crate::error::Result;
use crate::utils::{column_as_f64, materialize_with_columns};

/// A theme's variables after recoding, plus the state and weight columns
#[derive(Debug, Clone)]
pub struct HarmonizedTable {
    pub theme: Theme,
    pub year: Year,
    pub variables: Vec<String>,
    pub state_column: String,
    pub weight_column: String,
    frame: DataFrame,
}

impl HarmonizedTable {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }
}

fn distinct_observed(values: &[Option<f64>]) -> usize {
    values
        .iter()
        .flatten()
        .map(|v| v.to_bits())
        .collect::<FxHashSet<u64>>()
        .len()
}

/// Recode one theme of a (raw or imputed) survey table
///
/// Categorical variables use the theme's ordinal reversal, binary variables
/// the theme's {1,2} mapping. Missing cells stay missing.
pub fn harmonize(
    year: Year,
    df: &DataFrame,
    spec: &ThemeSpec,
    columns: &SurveyColumns,
) -> Result<HarmonizedTable> {
    let context = format!("{} {} harmonizer", year, spec.theme);
    let variables = spec.variables();

    let mut required: Vec<&str> = variables.iter().map(String::as_str).collect();
    for key in [columns.state.as_str(), columns.weight.as_str()] {
        if !required.contains(&key) {
            required.push(key);
        }
    }
    let df = &materialize_with_columns(&df.clone().lazy(), &required, &context)?;

    let mut out = Vec::with_capacity(variables.len() + 2);
    for name in &spec.categorical {
        let values = column_as_f64(df, name, &context)?;
        let n_distinct = distinct_observed(&values);
        debug!(year, theme = %spec.theme, variable = %name, n_distinct, "Recoding categorical");
        let recoded: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.map(|v| spec.theme.recode_categorical(v, n_distinct)))
            .collect();
        out.push(Column::new(name.as_str().into(), recoded));
    }
    for name in &spec.binary {
        let recoded: Vec<Option<f64>> = column_as_f64(df, name, &context)?
            .into_iter()
            .map(|v| v.map(|v| spec.theme.recode_binary(v)))
            .collect();
        out.push(Column::new(name.as_str().into(), recoded));
    }
    for name in [&columns.state, &columns.weight] {
        if !variables.contains(name) {
            out.push(Column::new(name.as_str().into(), column_as_f64(df, name, &context)?));
        }
    }

    Ok(HarmonizedTable {
        theme: spec.theme,
        year,
        variables,
        state_column: columns.state.clone(),
        weight_column: columns.weight.clone(),
        frame: DataFrame::new(out)?,
    })
}
