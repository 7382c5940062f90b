//! Pearson correlation matrix over the numeric columns of a table
//!
//! Each pair uses only rows where both values are present. A column with no
//! variance over those rows correlates as NaN.

use nalgebra::DMatrix;
use polars::prelude::*;

use crate::error::Result;
use crate::imputation::IMPUTED_SUFFIX;
use crate::utils::column_as_f64;

#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: DMatrix<f64>,
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Pearson correlation of two columns over their pairwise-complete rows
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Correlation of every numeric, non-mask column of `df`
pub fn correlation_matrix(df: &DataFrame) -> Result<CorrelationMatrix> {
    let columns: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| is_numeric(c.dtype()) && !c.name().ends_with(IMPUTED_SUFFIX))
        .map(|c| c.name().to_string())
        .collect();
    let data: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|name| column_as_f64(df, name, "correlation matrix"))
        .collect::<Result<_>>()?;

    let p = columns.len();
    let mut values = DMatrix::<f64>::from_element(p, p, f64::NAN);
    for i in 0..p {
        for j in i..p {
            let r = pearson(&data[i], &data[j]);
            values[(i, j)] = r;
            values[(j, i)] = r;
        }
    }
    Ok(CorrelationMatrix { columns, values })
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[(i, j)])
    }

    /// Square frame with a leading `variable` column
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new("variable".into(), self.columns.clone())];
        for (j, name) in self.columns.iter().enumerate() {
            columns.push(Column::new(
                name.as_str().into(),
                self.values.column(j).iter().copied().collect::<Vec<f64>>(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }
}
