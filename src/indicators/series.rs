//! State-indexed indicator series
//!
//! Sub-indicators are addressed by a typed `(kind, year)` key instead of
//! column names such as `sub_indicator_health_2022`.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Theme;
use crate::data::Year;
use crate::error::{PipelineError, Result};
use crate::utils::StateCode;

/// What a series measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Health,
    MentalHealth,
    /// Survey-based household economics
    MicroEco,
    /// PCA synthesis of state GDP indicators
    MacroEco,
    /// Mean of micro and macro economics; the third pillar of the index
    Economic,
}

impl IndicatorKind {
    /// The three pillars of the global index, in the order they are reported
    pub const PILLARS: [IndicatorKind; 3] = [
        IndicatorKind::MentalHealth,
        IndicatorKind::Health,
        IndicatorKind::Economic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Health => "health",
            IndicatorKind::MentalHealth => "mental_health",
            IndicatorKind::MicroEco => "micro_eco",
            IndicatorKind::MacroEco => "macro_eco",
            IndicatorKind::Economic => "economic",
        }
    }
}

impl From<Theme> for IndicatorKind {
    fn from(theme: Theme) -> Self {
        match theme {
            Theme::Health => IndicatorKind::Health,
            Theme::MentalHealth => IndicatorKind::MentalHealth,
            Theme::MicroEco => IndicatorKind::MicroEco,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubIndicatorKey {
    pub kind: IndicatorKind,
    pub year: Year,
}

impl SubIndicatorKey {
    pub fn new(kind: IndicatorKind, year: Year) -> Self {
        Self { kind, year }
    }
}

/// One value per state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubIndicator {
    values: BTreeMap<StateCode, f64>,
}

impl SubIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: StateCode, value: f64) {
        self.values.insert(state, value);
    }

    pub fn get(&self, state: StateCode) -> Option<f64> {
        self.values.get(&state).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn states(&self) -> impl Iterator<Item = StateCode> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateCode, f64)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.values().copied()
    }

    /// Combine several series state by state, keeping only states present
    /// in every one of them
    pub fn inner_join_with<F>(series: &[&SubIndicator], combine: F) -> SubIndicator
    where
        F: Fn(&[f64]) -> f64,
    {
        let Some((first, rest)) = series.split_first() else {
            return SubIndicator::new();
        };

        let mut out = SubIndicator::new();
        let mut row = Vec::with_capacity(series.len());
        for (state, value) in first.iter() {
            row.clear();
            row.push(value);
            for other in rest {
                match other.get(state) {
                    Some(v) => row.push(v),
                    None => break,
                }
            }
            if row.len() == series.len() {
                out.insert(state, combine(&row));
            }
        }
        out
    }
}

impl FromIterator<(StateCode, f64)> for SubIndicator {
    fn from_iter<I: IntoIterator<Item = (StateCode, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Every sub-indicator computed so far
#[derive(Debug, Clone, Default)]
pub struct SubIndicatorStore {
    series: BTreeMap<SubIndicatorKey, SubIndicator>,
}

impl SubIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SubIndicatorKey, series: SubIndicator) {
        self.series.insert(key, series);
    }

    pub fn get(&self, kind: IndicatorKind, year: Year) -> Result<&SubIndicator> {
        self.series
            .get(&SubIndicatorKey::new(kind, year))
            .ok_or(PipelineError::MissingSubIndicator { kind, year })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubIndicatorKey, &SubIndicator)> {
        self.series.iter()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn extend(&mut self, other: SubIndicatorStore) {
        self.series.extend(other.series);
    }

    /// Long frame: FIPSST, year, kind, value
    pub fn to_long_frame(&self) -> Result<DataFrame> {
        let mut states = Vec::new();
        let mut years = Vec::new();
        let mut kinds = Vec::new();
        let mut values = Vec::new();
        for (key, series) in &self.series {
            for (state, value) in series.iter() {
                states.push(state);
                years.push(key.year as u32);
                kinds.push(key.kind.as_str());
                values.push(value);
            }
        }
        Ok(DataFrame::new(vec![
            Column::new("FIPSST".into(), states),
            Column::new("year".into(), years),
            Column::new("kind".into(), kinds),
            Column::new("value".into(), values),
        ])?)
    }
}

/// Year → global index
#[derive(Debug, Clone, Default)]
pub struct GlobalHealthIndex {
    by_year: BTreeMap<Year, SubIndicator>,
}

impl GlobalHealthIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: Year, series: SubIndicator) {
        self.by_year.insert(year, series);
    }

    pub fn get(&self, year: Year) -> Result<&SubIndicator> {
        self.by_year.get(&year).ok_or(PipelineError::MissingYear(year))
    }

    pub fn years(&self) -> Vec<Year> {
        self.by_year.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, &SubIndicator)> {
        self.by_year.iter().map(|(y, s)| (*y, s))
    }

    /// Long frame: FIPSST, year, value
    pub fn to_long_frame(&self) -> Result<DataFrame> {
        let mut states = Vec::new();
        let mut years = Vec::new();
        let mut values = Vec::new();
        for (year, series) in self.iter() {
            for (state, value) in series.iter() {
                states.push(state);
                years.push(year as u32);
                values.push(value);
            }
        }
        Ok(DataFrame::new(vec![
            Column::new("FIPSST".into(), states),
            Column::new("year".into(), years),
            Column::new("global_index".into(), values),
        ])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(pairs: &[(StateCode, f64)]) -> SubIndicator {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_inner_join_keeps_shared_states_only() {
        let a = series(&[(1, 1.0), (2, 2.0), (4, 4.0)]);
        let b = series(&[(1, 10.0), (2, 20.0), (3, 30.0)]);

        let sum = SubIndicator::inner_join_with(&[&a, &b], |v| v.iter().sum());
        assert_eq!(sum, series(&[(1, 11.0), (2, 22.0)]));
    }

    #[test]
    fn test_store_lookup_by_typed_key() {
        let mut store = SubIndicatorStore::new();
        store.insert(SubIndicatorKey::new(IndicatorKind::Health, 2022), series(&[(1, 0.5)]));

        assert_eq!(store.get(IndicatorKind::Health, 2022).unwrap().get(1), Some(0.5));
        assert!(matches!(
            store.get(IndicatorKind::Health, 2023),
            Err(PipelineError::MissingSubIndicator { year: 2023, .. })
        ));
    }

    #[test]
    fn test_long_frame_shape() {
        let mut store = SubIndicatorStore::new();
        store.insert(SubIndicatorKey::new(IndicatorKind::Health, 2022), series(&[(1, 0.5), (2, 0.6)]));
        store.insert(SubIndicatorKey::new(IndicatorKind::MacroEco, 2022), series(&[(1, 0.1)]));

        let df = store.to_long_frame().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 4);
    }
}
