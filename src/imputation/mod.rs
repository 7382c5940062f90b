//! Survey table imputation
//!
//! Two passes per year:
//! 1. every column except height/weight, k-NN over the whole population
//! 2. height/weight, k-NN over rows whose form type is not the baseline
//!    (baseline questionnaires never ask for measurements, so those rows keep
//!    whatever was recorded)
//!
//! Every original column gets an `<column>_imputed` companion flag so
//! downstream analysis can tell filled values from observed ones.

pub mod checks;
pub mod knn;

pub use checks::{check_imputation, ImputationReport};
pub use knn::{nan_euclidean, EmptyColumn, KnnImputer};

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::SurveyColumns;
use crate::data::Year;
use crate::error::{PipelineError, Result};
use crate::utils::{column_as_f64, require_columns};

/// Suffix of the companion mask columns
pub const IMPUTED_SUFFIX: &str = "_imputed";

pub fn mask_column_name(column: &str) -> String {
    format!("{}{}", column, IMPUTED_SUFFIX)
}

/// Form-type tags ("T1".."T6") split into prefix and numeric code
///
/// Prefixes are kept per row. Rows with no tag take the first observed
/// prefix when they are re-encoded.
#[derive(Debug, Clone)]
pub(crate) struct FormTypes {
    pub prefixes: Vec<Option<String>>,
    pub codes: Vec<Option<i64>>,
    fallback_prefix: String,
}

impl FormTypes {
    /// Strip the leading non-numeric characters of each tag and parse the rest
    pub(crate) fn parse(df: &DataFrame, column: &str, year: Year) -> Result<Self> {
        let values = df.column(column)?.cast(&DataType::String)?;
        let mut prefixes = Vec::with_capacity(df.height());
        let mut codes = Vec::with_capacity(df.height());

        for value in values.str()?.into_iter() {
            let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
                prefixes.push(None);
                codes.push(None);
                continue;
            };
            let split = raw.find(|c: char| c.is_ascii_digit()).unwrap_or(raw.len());
            let code = raw[split..].parse::<i64>().map_err(|_| PipelineError::InvalidFormType {
                year,
                column: column.to_string(),
                value: raw.to_string(),
            })?;
            prefixes.push(Some(raw[..split].to_string()));
            codes.push(Some(code));
        }

        let fallback_prefix = prefixes.iter().flatten().next().cloned().unwrap_or_else(|| "T".to_string());
        Ok(Self {
            prefixes,
            codes,
            fallback_prefix,
        })
    }

    /// Tag for `row` carrying `code`
    pub(crate) fn encode(&self, row: usize, code: i64) -> String {
        let prefix = self
            .prefixes
            .get(row)
            .and_then(Option::as_deref)
            .unwrap_or(self.fallback_prefix.as_str());
        format!("{}{}", prefix, code)
    }
}

/// Batch imputer for one survey year
#[derive(Debug, Clone)]
pub struct SurveyImputer {
    knn: KnnImputer,
    columns: SurveyColumns,
    baseline_form_code: i64,
}

impl SurveyImputer {
    pub fn new(columns: SurveyColumns, n_neighbors: usize, baseline_form_code: i64) -> Self {
        Self {
            knn: KnnImputer::new(n_neighbors),
            columns,
            baseline_form_code,
        }
    }

    /// Impute one year's table
    ///
    /// Returns the input columns in their original order (numeric columns as
    /// rounded `f64`, form type as its string tag) followed by one boolean
    /// `<column>_imputed` column per input column.
    pub fn impute(&self, year: Year, df: &DataFrame) -> Result<DataFrame> {
        let context = format!("{} imputer", year);
        let form_col = self.columns.form_type.as_str();
        let [height_col, weight_col] = &self.columns.anthropometric;
        require_columns(df, &[form_col, height_col.as_str(), weight_col.as_str()], &context)?;

        info!(year, rows = df.height(), cols = df.width(), k = self.knn.n_neighbors(), "Imputing survey table");

        let form_types = FormTypes::parse(df, form_col, year)?;
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(names.len());
        for name in &names {
            if name == form_col {
                values.push(form_types.codes.iter().map(|c| c.map(|c| c as f64)).collect());
            } else {
                values.push(column_as_f64(df, name, &context)?);
            }
        }
        let mask: Vec<Vec<bool>> = values
            .iter()
            .map(|col| col.iter().map(Option::is_none).collect())
            .collect();

        let is_anthro = |name: &str| name == height_col || name == weight_col;

        // Pass 1: everything but height/weight, whole population
        let general: Vec<usize> = (0..names.len()).filter(|&i| !is_anthro(names[i].as_str())).collect();
        let general_values: Vec<Vec<Option<f64>>> = general.iter().map(|&i| values[i].clone()).collect();
        let filled = self.knn.impute(&general_values).map_err(|e| PipelineError::EmptyColumn {
            year,
            column: names[general[e.index]].clone(),
        })?;
        for (pos, &i) in general.iter().enumerate() {
            values[i] = filled[pos].iter().map(|&v| Some(v)).collect();
        }

        // Pass 2: height/weight, non-baseline form types only
        let form_idx = names.iter().position(|n| n == form_col).unwrap_or_default();
        let measured_rows: Vec<usize> = values[form_idx]
            .iter()
            .enumerate()
            .filter(|(_, code)| {
                matches!(code, Some(c) if c.round_ties_even() as i64 != self.baseline_form_code)
            })
            .map(|(r, _)| r)
            .collect();
        let anthro: Vec<usize> = (0..names.len()).filter(|&i| is_anthro(names[i].as_str())).collect();
        let subset: Vec<Vec<Option<f64>>> = anthro
            .iter()
            .map(|&i| measured_rows.iter().map(|&r| values[i][r]).collect())
            .collect();
        let filled = self.knn.impute(&subset).map_err(|e| PipelineError::EmptyColumn {
            year,
            column: names[anthro[e.index]].clone(),
        })?;
        for (pos, &i) in anthro.iter().enumerate() {
            for (sub_r, &r) in measured_rows.iter().enumerate() {
                values[i][r] = Some(filled[pos][sub_r]);
            }
        }
        debug!(year, measured = measured_rows.len(), "Anthropometric pass done");

        // Round (source data is categorical-coded) and rebuild
        let mut out: Vec<Column> = Vec::with_capacity(names.len() * 2);
        for (i, name) in names.iter().enumerate() {
            let rounded = values[i].iter().map(|v| v.map(f64::round_ties_even));
            if i == form_idx {
                let tags: Vec<Option<String>> = rounded
                    .enumerate()
                    .map(|(row, v)| v.map(|c| form_types.encode(row, c as i64)))
                    .collect();
                out.push(Column::new(name.as_str().into(), tags));
            } else {
                out.push(Column::new(name.as_str().into(), rounded.collect::<Vec<Option<f64>>>()));
            }
        }
        for (i, name) in names.iter().enumerate() {
            out.push(Column::new(mask_column_name(name).into(), mask[i].clone()));
        }

        let imputed_cells: usize = mask.iter().flatten().filter(|m| **m).count();
        info!(year, imputed_cells, "Imputation finished");
        Ok(DataFrame::new(out)?)
    }
}
