//! Macro-economic synthesis
//!
//! Reduces several state GDP indicators to one score in (0, 1):
//! 1. Standardize each variable (zero mean, unit population variance)
//! 2. PCA: first eigenvector of the covariance of the standardized data
//! 3. Weights = |loading| / sum |loading|
//! 4. Raw score = standardized data · weights
//! 5. Re-standardize the score and map it through the standard normal CDF
//!
//! Step 5 trades distributional fidelity for a bounded monotonic transform.

use nalgebra::{DMatrix, SymmetricEigen};
use std::f64::consts::SQRT_2;
use tracing::{debug, warn};

use super::SubIndicator;
use crate::data::{EconomicPanel, Year};
use crate::error::{PipelineError, Result};
use crate::utils::{column_as_f64, StateCode};

/// Full result of one year's synthesis
#[derive(Debug, Clone)]
pub struct MacroSynthesis {
    pub year: Year,
    pub variables: Vec<String>,
    /// First principal component loadings (sign is arbitrary)
    pub loadings: Vec<f64>,
    /// Normalized absolute loadings; sums to 1
    pub weights: Vec<f64>,
    pub explained_variance_ratio: f64,
    /// Weighted sum of standardized variables, before the CDF mapping
    pub raw_scores: SubIndicator,
    /// Final indicator in (0, 1)
    pub indicator: SubIndicator,
}

/// Standard normal cumulative distribution function
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * libm::erfc(-z / SQRT_2)
}

/// Z-scores with population standard deviation
///
/// Returns `None` for constant input.
pub fn z_scores(values: &[f64]) -> Option<Vec<f64>> {
    let n = values.len() as f64;
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if !(std > f64::EPSILON * mean.abs().max(1.0)) {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / std).collect())
}

/// Loadings of the highest-variance component and its share of variance
///
/// `data` is n × p, already centred.
pub fn first_component(data: &DMatrix<f64>) -> (Vec<f64>, f64) {
    let n = data.nrows().max(1) as f64;
    let cov = (data.transpose() * data) / n;
    let eigen = SymmetricEigen::new(cov);

    let (best, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });

    let total: f64 = eigen.eigenvalues.iter().filter(|&&v| v > 0.0).sum();
    let ratio = if total > 0.0 {
        eigen.eigenvalues[best].max(0.0) / total
    } else {
        0.0
    };
    (eigen.eigenvectors.column(best).iter().copied().collect(), ratio)
}

/// Non-negative weights from loadings, normalized to sum to 1
pub fn loading_weights(loadings: &[f64]) -> Vec<f64> {
    let total: f64 = loadings.iter().map(|l| l.abs()).sum();
    if total == 0.0 {
        return vec![1.0 / loadings.len().max(1) as f64; loadings.len()];
    }
    loadings.iter().map(|l| l.abs() / total).collect()
}

/// Synthesize one year's macro-economic indicator
///
/// States with a missing value in any variable are dropped.
///
/// # Errors
/// `DegenerateVariance` when a variable, or the resulting score, is constant
/// across states.
pub fn synthesize(panel: &EconomicPanel, variables: &[String], year: Year) -> Result<MacroSynthesis> {
    let context = format!("{} macro-economic synthesis", year);
    let states = panel.states()?;
    let columns: Vec<Vec<Option<f64>>> = variables
        .iter()
        .map(|v| column_as_f64(panel.frame(), v, &context))
        .collect::<Result<_>>()?;

    let complete: Vec<usize> = (0..states.len())
        .filter(|&r| columns.iter().all(|c| c[r].is_some()))
        .collect();
    if complete.len() < states.len() {
        warn!(year, dropped = states.len() - complete.len(), "States with missing economic values dropped");
    }
    let kept_states: Vec<StateCode> = complete.iter().map(|&r| states[r]).collect();

    let mut standardized = DMatrix::<f64>::zeros(complete.len(), variables.len());
    for (j, column) in columns.iter().enumerate() {
        let values: Vec<f64> = complete.iter().filter_map(|&r| column[r]).collect();
        let z = z_scores(&values).ok_or_else(|| PipelineError::DegenerateVariance {
            context: context.clone(),
            column: variables[j].clone(),
        })?;
        for (i, v) in z.into_iter().enumerate() {
            standardized[(i, j)] = v;
        }
    }

    let (loadings, explained_variance_ratio) = first_component(&standardized);
    let weights = loading_weights(&loadings);
    debug!(year, ?weights, explained_variance_ratio, "First component weights");

    let raw: Vec<f64> = (0..standardized.nrows())
        .map(|i| (0..weights.len()).map(|j| standardized[(i, j)] * weights[j]).sum())
        .collect();
    let z = z_scores(&raw).ok_or_else(|| PipelineError::DegenerateVariance {
        context: context.clone(),
        column: "synthesized score".to_string(),
    })?;

    Ok(MacroSynthesis {
        year,
        variables: variables.to_vec(),
        loadings,
        weights,
        explained_variance_ratio,
        raw_scores: kept_states.iter().copied().zip(raw).collect(),
        indicator: kept_states
            .iter()
            .copied()
            .zip(z.into_iter().map(standard_normal_cdf))
            .collect(),
    })
}
