//! Multiple correspondence analysis
//!
//! Correspondence analysis of the one-hot indicator matrix `Z` (n rows, J
//! categories over Q variables):
//!
//! ```text
//! P = Z / N,  r = row masses,  c = column masses
//! S = D_r^-1/2 (P - r cᵀ) D_c^-1/2
//! SᵀS = V Λ Vᵀ
//! rows    F = D_r^-1/2 S V
//! columns G = D_c^-1/2 V Σ
//! ```
//!
//! Total inertia is `J / Q - 1`. Axis signs are arbitrary.

use nalgebra::{DMatrix, SymmetricEigen};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::data::{QuestionGuide, Year};
use crate::error::{PipelineError, Result};
use crate::imputation::IMPUTED_SUFFIX;
use crate::utils::column_as_f64;

/// One modality of one variable
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub column: String,
    /// `None` for the missing-value modality
    pub code: Option<i64>,
    pub label: String,
}

impl Category {
    fn new(column: &str, code: Option<i64>) -> Self {
        let label = match code {
            Some(c) => format!("{column}_{c}"),
            None => format!("{column}_NA"),
        };
        Self {
            column: column.to_string(),
            code,
            label,
        }
    }
}

#[derive(Debug, Clone)]
pub struct McaResult {
    pub year: Year,
    pub variables: Vec<String>,
    pub categories: Vec<Category>,
    /// Inertia of the retained axes, descending
    pub eigenvalues: Vec<f64>,
    pub total_inertia: f64,
    /// n × components
    pub row_coordinates: DMatrix<f64>,
    /// categories × components
    pub column_coordinates: DMatrix<f64>,
}

/// Categories split by their distance from the origin on the first two axes
#[derive(Debug, Clone)]
pub struct CategorySplit<'a> {
    /// Farthest first
    pub principal: Vec<&'a Category>,
    pub secondary: Vec<&'a Category>,
}

/// Fit an MCA on every column except `drop_columns` and imputation masks
///
/// Values are read as integer response codes; a missing value forms its own
/// `<column>_NA` category.
pub fn fit_mca(year: Year, df: &DataFrame, drop_columns: &[String], n_components: usize) -> Result<McaResult> {
    let context = format!("{} MCA", year);
    let variables: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .filter(|c| !c.ends_with(IMPUTED_SUFFIX) && !drop_columns.contains(c))
        .collect();
    if variables.is_empty() {
        return Err(PipelineError::MissingColumn {
            context,
            column: "any categorical column".to_string(),
        });
    }

    // Category index per cell
    let n = df.height();
    let mut categories = Vec::new();
    let mut cells: Vec<Vec<usize>> = Vec::with_capacity(variables.len());
    for name in &variables {
        let codes: Vec<Option<i64>> = column_as_f64(df, name, &context)?
            .into_iter()
            .map(|v| v.map(|x| x.round_ties_even() as i64))
            .collect();
        let observed: BTreeSet<i64> = codes.iter().flatten().copied().collect();
        let mut levels: Vec<Option<i64>> = observed.into_iter().map(Some).collect();
        if codes.iter().any(Option::is_none) {
            levels.push(None);
        }

        let offset = categories.len();
        cells.push(
            codes
                .iter()
                .map(|code| offset + levels.iter().position(|l| l == code).unwrap_or(0))
                .collect(),
        );
        categories.extend(levels.into_iter().map(|code| Category::new(name, code)));
    }

    let j = categories.len();
    let q = variables.len() as f64;
    let total = n as f64 * q;
    let mut counts = vec![0.0f64; j];
    for column in &cells {
        for &k in column {
            counts[k] += 1.0;
        }
    }
    let row_mass = 1.0 / n.max(1) as f64;
    let col_mass: Vec<f64> = counts.iter().map(|c| c / total).collect();

    // Standardized residuals
    let mut s = DMatrix::<f64>::zeros(n, j);
    for i in 0..n {
        for k in 0..j {
            s[(i, k)] = -(row_mass * col_mass[k]).sqrt();
        }
        for column in &cells {
            let k = column[i];
            s[(i, k)] += (1.0 / total) / (row_mass * col_mass[k]).sqrt();
        }
    }

    let eigen = SymmetricEigen::new(s.transpose() * &s);
    let mut order: Vec<usize> = (0..j).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let eigenvalues_all: Vec<f64> = order.iter().map(|&k| eigen.eigenvalues[k].max(0.0)).collect();
    let total_inertia: f64 = eigenvalues_all.iter().sum();

    let components = n_components.min(j);
    let mut v = DMatrix::<f64>::zeros(j, components);
    for (dst, &src) in order.iter().take(components).enumerate() {
        v.set_column(dst, &eigen.eigenvectors.column(src));
    }

    let mut row_coordinates = &s * &v;
    row_coordinates /= row_mass.sqrt();

    let mut column_coordinates = DMatrix::<f64>::zeros(j, components);
    for k in 0..j {
        for d in 0..components {
            column_coordinates[(k, d)] = v[(k, d)] * eigenvalues_all[d].sqrt() / col_mass[k].sqrt();
        }
    }

    let eigenvalues = eigenvalues_all[..components].to_vec();
    info!(year, variables = variables.len(), categories = j, ?eigenvalues, "Fitted MCA");

    Ok(McaResult {
        year,
        variables,
        categories,
        eigenvalues,
        total_inertia,
        row_coordinates,
        column_coordinates,
    })
}

impl McaResult {
    /// Share of total inertia per retained axis
    pub fn explained_inertia(&self) -> Vec<f64> {
        if self.total_inertia == 0.0 {
            return vec![0.0; self.eigenvalues.len()];
        }
        self.eigenvalues.iter().map(|e| e / self.total_inertia).collect()
    }

    /// Replace numeric labels with question-guide labels
    ///
    /// Variables absent from the guide keep their numeric labels. For a
    /// variable the guide does describe, an unknown code is an error.
    pub fn relabel(&mut self, guide: &QuestionGuide) -> Result<()> {
        for category in &mut self.categories {
            let (Some(codes), Some(code)) = (guide.response_codes(&category.column), category.code) else {
                continue;
            };
            category.label = format!("{}_{}", category.column, codes.label(code)?);
        }
        Ok(())
    }

    fn distance(&self, k: usize) -> f64 {
        let dims = self.column_coordinates.ncols().min(2);
        (0..dims)
            .map(|d| self.column_coordinates[(k, d)].powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// The `n` categories farthest from the origin, and the rest
    pub fn principal_categories(&self, n: usize) -> CategorySplit<'_> {
        let mut order: Vec<usize> = (0..self.categories.len()).collect();
        order.sort_by(|&a, &b| self.distance(b).total_cmp(&self.distance(a)));

        let split = n.min(order.len());
        debug!(year = self.year, principal = split, "Split MCA categories");
        CategorySplit {
            principal: order[..split].iter().map(|&k| &self.categories[k]).collect(),
            secondary: order[split..].iter().map(|&k| &self.categories[k]).collect(),
        }
    }

    fn coordinate_columns(matrix: &DMatrix<f64>) -> Vec<Column> {
        (0..matrix.ncols())
            .map(|d| Column::new(format!("dim_{d}").into(), matrix.column(d).iter().copied().collect::<Vec<f64>>()))
            .collect()
    }

    /// label, column, dim_0, dim_1, ...
    pub fn column_coordinates_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![
            Column::new("label".into(), self.categories.iter().map(|c| c.label.as_str()).collect::<Vec<_>>()),
            Column::new("column".into(), self.categories.iter().map(|c| c.column.as_str()).collect::<Vec<_>>()),
        ];
        columns.extend(Self::coordinate_columns(&self.column_coordinates));
        Ok(DataFrame::new(columns)?)
    }

    /// dim_0, dim_1, ... in input row order
    pub fn row_coordinates_frame(&self) -> Result<DataFrame> {
        Ok(DataFrame::new(Self::coordinate_columns(&self.row_coordinates))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identical_pair() -> DataFrame {
        df![
            "FIPSST" => &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0],
            "A" => &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0],
            "B" => &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0],
            "A_imputed" => &[false, false, true, false, false, false],
        ]
        .unwrap()
    }

    #[test]
    fn test_masks_and_dropped_columns_excluded() {
        let mca = fit_mca(2022, &identical_pair(), &["FIPSST".to_string()], 2).unwrap();
        assert_eq!(mca.variables, vec!["A", "B"]);
        let labels: Vec<&str> = mca.categories.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["A_1", "A_2", "B_1", "B_2"]);
    }

    #[test]
    fn test_identical_variables_load_one_axis() {
        let mca = fit_mca(2022, &identical_pair(), &["FIPSST".to_string()], 2).unwrap();

        // J / Q - 1 = 4 / 2 - 1
        assert_relative_eq!(mca.total_inertia, 1.0, epsilon = 1e-9);
        assert_relative_eq!(mca.eigenvalues[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(mca.explained_inertia()[0], 1.0, epsilon = 1e-9);
        assert!(mca.eigenvalues.iter().all(|e| *e >= 0.0));

        assert_eq!(mca.row_coordinates.nrows(), 6);
        assert_eq!(mca.column_coordinates.shape(), (4, 2));
        // Respondents answering 1 and 2 sit on opposite sides of the first axis
        assert_relative_eq!(mca.row_coordinates[(0, 0)], -mca.row_coordinates[(1, 0)], epsilon = 1e-9);
        assert_relative_eq!(mca.row_coordinates[(0, 0)].abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_values_form_own_category() {
        let df = df![
            "A" => &[Some(1.0), None, Some(2.0), Some(1.0)],
            "B" => &[Some(1.0), Some(2.0), Some(2.0), Some(3.0)],
        ]
        .unwrap();
        let mca = fit_mca(2023, &df, &[], 2).unwrap();
        assert_eq!(mca.categories.len(), 6);
        assert_eq!(mca.categories[2].label, "A_NA");
        assert_relative_eq!(mca.total_inertia, 6.0 / 2.0 - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_principal_split_is_ordered() {
        let df = df![
            "A" => &[1.0, 1.0, 2.0, 2.0, 3.0, 1.0, 2.0, 1.0],
            "B" => &[1.0, 2.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0],
            "C" => &[2.0, 2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 2.0],
        ]
        .unwrap();
        let mca = fit_mca(2021, &df, &[], 2).unwrap();
        let split = mca.principal_categories(3);

        assert_eq!(split.principal.len(), 3);
        assert_eq!(split.secondary.len(), mca.categories.len() - 3);
        let index = |c: &Category| mca.categories.iter().position(|x| x == c).unwrap();
        let far = split.principal.iter().map(|c| mca.distance(index(*c))).fold(f64::INFINITY, f64::min);
        let near = split.secondary.iter().map(|c| mca.distance(index(*c))).fold(0.0, f64::max);
        assert!(far >= near);
    }

    #[test]
    fn test_relabel_with_question_guide() {
        let guide_frame = df![
            "Variable" => &["A"],
            "Question" => &["General health"],
            "Response Code" => &["1 = Good; 2 = Poor"],
        ]
        .unwrap();
        let guide = QuestionGuide::from_frame(&guide_frame).unwrap();

        let mut mca = fit_mca(2022, &identical_pair(), &["FIPSST".to_string()], 2).unwrap();
        mca.relabel(&guide).unwrap();
        assert_eq!(mca.categories[0].label, "A_Good");
        assert_eq!(mca.categories[1].label, "A_Poor");
        assert_eq!(mca.categories[2].label, "B_1");

        let frame = mca.column_coordinates_frame().unwrap();
        assert_eq!(frame.width(), 4);
    }

    #[test]
    fn test_relabel_unknown_code_fails() {
        let guide_frame = df![
            "Variable" => &["A"],
            "Question" => &["General health"],
            "Response Code" => &["1 = Good"],
        ]
        .unwrap();
        let guide = QuestionGuide::from_frame(&guide_frame).unwrap();

        let mut mca = fit_mca(2022, &identical_pair(), &["FIPSST".to_string()], 2).unwrap();
        assert!(matches!(
            mca.relabel(&guide),
            Err(PipelineError::UnknownResponseCode { code: 2, .. })
        ));
    }
}
