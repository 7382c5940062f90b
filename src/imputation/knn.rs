//! k-nearest-neighbour imputation
//!
//! NaN-aware Euclidean distance, uniform weighting:
//! - distance between two rows uses only coordinates observed in both,
//!   scaled up by `total / present` so rows with fewer shared answers are not
//!   artificially close
//! - donors for a column are rows where that column is observed
//! - the fill value is the plain mean of the `k` nearest donors
//! - a receiver with no donor at a finite distance gets the column mean
//!
//! Distances are always computed on the original (unfilled) values, so the
//! order in which cells are filled does not matter. Receivers are processed
//! in parallel with Rayon; each owns its distance buffer.

use rayon::prelude::*;
use std::cmp::Ordering;

/// A column had no observed value, so there is nothing to impute from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyColumn {
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct KnnImputer {
    n_neighbors: usize,
}

impl Default for KnnImputer {
    fn default() -> Self {
        Self { n_neighbors: 3 }
    }
}

impl KnnImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Fill every missing cell
    ///
    /// `columns[c][r]` is the value of column `c` in row `r`; all columns must
    /// have the same length. Returns the filled matrix in the same layout.
    pub fn impute(&self, columns: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>, EmptyColumn> {
        let n_cols = columns.len();
        let n_rows = columns.first().map_or(0, Vec::len);

        let mut means = Vec::with_capacity(n_cols);
        for (index, column) in columns.iter().enumerate() {
            let (sum, count) = column
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 && n_rows > 0 {
                return Err(EmptyColumn { index });
            }
            means.push(if count > 0 { sum / count as f64 } else { f64::NAN });
        }

        // Row-major copy: distance computation walks rows
        let rows: Vec<Vec<Option<f64>>> = (0..n_rows)
            .map(|r| columns.iter().map(|c| c[r]).collect())
            .collect();

        let receivers: Vec<usize> = (0..n_rows)
            .filter(|&r| rows[r].iter().any(Option::is_none))
            .collect();

        let fills: Vec<(usize, Vec<(usize, f64)>)> = receivers
            .par_iter()
            .map(|&r| (r, self.fill_row(r, &rows, &means)))
            .collect();

        let mut out: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| c.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        for (r, cells) in fills {
            for (c, value) in cells {
                out[c][r] = value;
            }
        }
        Ok(out)
    }

    fn fill_row(&self, r: usize, rows: &[Vec<Option<f64>>], means: &[f64]) -> Vec<(usize, f64)> {
        let receiver = &rows[r];
        let distances: Vec<Option<f64>> = rows
            .iter()
            .enumerate()
            .map(|(d, donor)| if d == r { None } else { nan_euclidean(receiver, donor) })
            .collect();

        let mut cells = Vec::new();
        for (c, value) in receiver.iter().enumerate() {
            if value.is_some() {
                continue;
            }

            let mut candidates: Vec<(f64, usize, f64)> = distances
                .iter()
                .enumerate()
                .filter_map(|(d, dist)| Some(((*dist)?, d, rows[d][c]?)))
                .collect();

            let fill = if candidates.is_empty() {
                means[c]
            } else {
                let k = self.n_neighbors.min(candidates.len());
                if candidates.len() > k {
                    candidates.select_nth_unstable_by(k - 1, by_distance_then_row);
                    candidates.truncate(k);
                }
                candidates.iter().map(|(_, _, v)| v).sum::<f64>() / k as f64
            };
            cells.push((c, fill));
        }
        cells
    }
}

fn by_distance_then_row(a: &(f64, usize, f64), b: &(f64, usize, f64)) -> Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

/// Euclidean distance over coordinates present in both rows
///
/// `None` when the rows share no observed coordinate.
pub fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let mut sum_sq = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            sum_sq += (x - y) * (x - y);
            present += 1;
        }
    }
    (present > 0).then(|| (a.len() as f64 / present as f64 * sum_sq).sqrt())
}
