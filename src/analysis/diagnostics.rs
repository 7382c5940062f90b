//! Rank tables and Kendall tau diagnostics
//!
//! Ranking uses competition ("min") ranks on the descending global index:
//! tied states share the lower rank and the next distinct value skips ahead
//! by the size of the tie.

use polars::prelude::*;
use std::cmp::Ordering;
use std::f64::consts::SQRT_2;
use tracing::{debug, warn};

use crate::data::Year;
use crate::error::Result;
use crate::indicators::{GlobalHealthIndex, IndicatorKind, SubIndicator, SubIndicatorStore};
use crate::utils::StateCode;

/// One state's position in one year's ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankRow {
    pub year: Year,
    pub state: StateCode,
    pub value: f64,
    pub rank: u32,
}

/// Kendall tau between the global index and one pillar for one year
#[derive(Debug, Clone, PartialEq)]
pub struct TauRow {
    pub year: Year,
    pub kind: IndicatorKind,
    /// Number of shared states
    pub n: usize,
    pub tau: f64,
    /// Two-sided, normal approximation with tie correction
    pub p_value: f64,
}

/// Tau-b statistic with its significance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KendallTau {
    pub tau: f64,
    pub p_value: f64,
}

/// Descending competition ranks, 1-based
///
/// NaN values rank after every number and never tie with each other.
pub fn competition_ranks(values: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| match (values[a].is_nan(), values[b].is_nan()) {
        (false, false) => values[b].total_cmp(&values[a]),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    });

    let mut ranks = vec![0u32; values.len()];
    for (position, &i) in order.iter().enumerate() {
        ranks[i] = if position > 0 && values[order[position - 1]] == values[i] {
            ranks[order[position - 1]]
        } else {
            position as u32 + 1
        };
    }
    ranks
}

/// Rank states by descending global index for each requested year
///
/// Years are taken as given. A repeated year produces a repeated block of
/// rows.
pub fn rank_states(index: &GlobalHealthIndex, years: &[Year]) -> Result<Vec<RankRow>> {
    warn_duplicate_years(years);

    let mut rows = Vec::new();
    for &year in years {
        let series = index.get(year)?;
        let (states, values): (Vec<StateCode>, Vec<f64>) = series.iter().unzip();
        let undefined = values.iter().filter(|v| v.is_nan()).count();
        if undefined > 0 {
            warn!(year, undefined, "Global index has NaN values; ranked last");
        }
        let ranks = competition_ranks(&values);

        let mut block: Vec<RankRow> = states
            .into_iter()
            .zip(values)
            .zip(ranks)
            .map(|((state, value), rank)| RankRow { year, state, value, rank })
            .collect();
        block.sort_by_key(|r| (r.rank, r.state));
        rows.extend(block);
    }
    Ok(rows)
}

/// Kendall tau-b with a two-sided p-value
///
/// Returns NaN for both fields when fewer than two pairs are available or
/// when either input is constant.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> KendallTau {
    let n = x.len().min(y.len());
    let nan = KendallTau { tau: f64::NAN, p_value: f64::NAN };
    if n < 2 {
        return nan;
    }

    let sign = |d: f64| d.partial_cmp(&0.0).map_or(0, |o| o as i64);
    let mut score: i64 = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            score += sign(x[i] - x[j]) * sign(y[i] - y[j]);
        }
    }

    let x_ties = tie_groups(&x[..n]);
    let y_ties = tie_groups(&y[..n]);
    let nf = n as f64;
    let n0 = nf * (nf - 1.0) / 2.0;
    let pairs = |ties: &[f64]| ties.iter().map(|t| t * (t - 1.0) / 2.0).sum::<f64>();
    let denominator = ((n0 - pairs(&x_ties)) * (n0 - pairs(&y_ties))).sqrt();
    if denominator == 0.0 {
        return nan;
    }
    let tau = score as f64 / denominator;

    let v0 = nf * (nf - 1.0) * (2.0 * nf + 5.0);
    let vt = |ties: &[f64]| ties.iter().map(|t| t * (t - 1.0) * (2.0 * t + 5.0)).sum::<f64>();
    let s1 = |ties: &[f64]| ties.iter().map(|t| t * (t - 1.0)).sum::<f64>();
    let s2 = |ties: &[f64]| ties.iter().map(|t| t * (t - 1.0) * (t - 2.0)).sum::<f64>();

    let mut variance = (v0 - vt(&x_ties) - vt(&y_ties)) / 18.0
        + s1(&x_ties) * s1(&y_ties) / (2.0 * nf * (nf - 1.0));
    if n > 2 {
        variance += s2(&x_ties) * s2(&y_ties) / (9.0 * nf * (nf - 1.0) * (nf - 2.0));
    }
    let z = score as f64 / variance.sqrt();
    let p_value = libm::erfc(z.abs() / SQRT_2);

    KendallTau { tau, p_value }
}

/// Sizes of groups of equal values
fn tie_groups(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut groups = Vec::new();
    let mut run = 1usize;
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            run += 1;
        } else {
            if run > 1 {
                groups.push(run as f64);
            }
            run = 1;
        }
    }
    if run > 1 {
        groups.push(run as f64);
    }
    groups
}

/// Tau between the global index and each pillar, per requested year
///
/// Only states present in both series enter a comparison.
pub fn tau_table(
    index: &GlobalHealthIndex,
    store: &SubIndicatorStore,
    years: &[Year],
) -> Result<Vec<TauRow>> {
    warn_duplicate_years(years);

    let mut rows = Vec::new();
    for &year in years {
        let global = index.get(year)?;
        for kind in IndicatorKind::PILLARS {
            let pillar = store.get(kind, year)?;
            let (g, p) = paired_values(global, pillar);
            let KendallTau { tau, p_value } = kendall_tau(&g, &p);
            debug!(year, kind = %kind, n = g.len(), tau, p_value, "Kendall tau");
            rows.push(TauRow { year, kind, n: g.len(), tau, p_value });
        }
    }
    Ok(rows)
}

fn paired_values(a: &SubIndicator, b: &SubIndicator) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .filter_map(|(state, value)| b.get(state).map(|other| (value, other)))
        .unzip()
}

fn warn_duplicate_years(years: &[Year]) {
    let mut seen = years.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != years.len() {
        warn!(?years, "Year list contains duplicates; rows will repeat");
    }
}

/// Rank rows as a frame: year, FIPSST, global_index, rank
pub fn ranks_to_frame(rows: &[RankRow]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new("year".into(), rows.iter().map(|r| r.year as u32).collect::<Vec<_>>()),
        Column::new("FIPSST".into(), rows.iter().map(|r| r.state).collect::<Vec<_>>()),
        Column::new("global_index".into(), rows.iter().map(|r| r.value).collect::<Vec<_>>()),
        Column::new("rank".into(), rows.iter().map(|r| r.rank).collect::<Vec<_>>()),
    ])?)
}

/// Tau rows as a frame: year, kind, n, tau, p_value
pub fn taus_to_frame(rows: &[TauRow]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new("year".into(), rows.iter().map(|r| r.year as u32).collect::<Vec<_>>()),
        Column::new("kind".into(), rows.iter().map(|r| r.kind.as_str()).collect::<Vec<_>>()),
        Column::new("n".into(), rows.iter().map(|r| r.n as u32).collect::<Vec<_>>()),
        Column::new("tau".into(), rows.iter().map(|r| r.tau).collect::<Vec<_>>()),
        Column::new("p_value".into(), rows.iter().map(|r| r.p_value).collect::<Vec<_>>()),
    ])?)
}
