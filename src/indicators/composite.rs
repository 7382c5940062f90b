//! Composite index construction
//!
//! - Economic pillar: arithmetic mean of micro (survey) and macro (GDP)
//!   economics, per state
//! - Global index: geometric mean of mental health, health and economic
//!   pillars, `(mental * health * eco)^(1/3)`
//!
//! Both joins are inner joins. A state missing from any input for a year is
//! left out of that year's output; nothing is imputed or zero-filled.

use tracing::debug;

use super::{GlobalHealthIndex, IndicatorKind, SubIndicator, SubIndicatorKey, SubIndicatorStore};
use crate::data::Year;
use crate::error::Result;

/// Mean of micro- and macro-economic sub-indicators
pub fn combine_economic(micro: &SubIndicator, macro_eco: &SubIndicator) -> SubIndicator {
    SubIndicator::inner_join_with(&[micro, macro_eco], |v| (v[0] + v[1]) / 2.0)
}

/// Cube root of the product of the three pillars
pub fn geometric_mean_index(
    mental: &SubIndicator,
    health: &SubIndicator,
    economic: &SubIndicator,
) -> SubIndicator {
    SubIndicator::inner_join_with(&[mental, health, economic], |v| {
        (v[0] * v[1] * v[2]).powf(1.0 / 3.0)
    })
}

/// Add the economic pillar for `year` from the stored micro and macro series
pub fn insert_economic(store: &mut SubIndicatorStore, year: Year) -> Result<()> {
    let micro = store.get(IndicatorKind::MicroEco, year)?;
    let macro_eco = store.get(IndicatorKind::MacroEco, year)?;
    let economic = combine_economic(micro, macro_eco);

    let dropped = micro.len().max(macro_eco.len()) - economic.len();
    if dropped > 0 {
        debug!(year, dropped, "States missing from micro or macro economics dropped");
    }
    store.insert(SubIndicatorKey::new(IndicatorKind::Economic, year), economic);
    Ok(())
}

/// Global index for every requested year
///
/// # Errors
/// `MissingSubIndicator` if a pillar was never computed for a year.
pub fn build_global_index(store: &SubIndicatorStore, years: &[Year]) -> Result<GlobalHealthIndex> {
    let mut index = GlobalHealthIndex::new();
    for &year in years {
        let mental = store.get(IndicatorKind::MentalHealth, year)?;
        let health = store.get(IndicatorKind::Health, year)?;
        let economic = store.get(IndicatorKind::Economic, year)?;

        let global = geometric_mean_index(mental, health, economic);
        let widest = mental.len().max(health.len()).max(economic.len());
        debug!(year, states = global.len(), dropped = widest - global.len(), "Built global index");
        index.insert(year, global);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use approx::assert_relative_eq;

    fn series(pairs: &[(u32, f64)]) -> SubIndicator {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_geometric_mean_identity() {
        let g = geometric_mean_index(&series(&[(1, 0.5)]), &series(&[(1, 0.8)]), &series(&[(1, 0.2)]));
        assert_relative_eq!(g.get(1).unwrap(), 0.430_886_938_006_376_7, epsilon = 1e-9);

        let g = geometric_mean_index(&series(&[(6, 0.9)]), &series(&[(6, 0.9)]), &series(&[(6, 0.9)]));
        assert_relative_eq!(g.get(6).unwrap(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_state_missing_from_one_pillar_is_dropped() {
        let mental = series(&[(1, 0.5), (2, 0.6), (3, 0.7)]);
        let health = series(&[(1, 0.5), (2, 0.6), (3, 0.7)]);
        let economic = series(&[(1, 0.5), (3, 0.7)]);

        let g = geometric_mean_index(&mental, &health, &economic);
        assert_eq!(g.states().collect::<Vec<_>>(), vec![1, 3]);
        assert!(g.get(2).is_none());
    }

    #[test]
    fn test_economic_is_arithmetic_mean() {
        let e = combine_economic(&series(&[(1, 0.2), (2, 0.4)]), &series(&[(1, 0.6), (5, 0.1)]));
        assert_eq!(e.len(), 1);
        assert_relative_eq!(e.get(1).unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_build_global_index_across_years() {
        let mut store = SubIndicatorStore::new();
        for year in [2022, 2023] {
            store.insert(SubIndicatorKey::new(IndicatorKind::MentalHealth, year), series(&[(1, 0.5), (2, 0.4)]));
            store.insert(SubIndicatorKey::new(IndicatorKind::Health, year), series(&[(1, 0.8), (2, 0.4)]));
            store.insert(SubIndicatorKey::new(IndicatorKind::MicroEco, year), series(&[(1, 0.1), (2, 0.4)]));
            store.insert(SubIndicatorKey::new(IndicatorKind::MacroEco, year), series(&[(1, 0.3), (2, 0.4)]));
            insert_economic(&mut store, year).unwrap();
        }

        let index = build_global_index(&store, &[2022, 2023]).unwrap();
        assert_eq!(index.years(), vec![2022, 2023]);
        assert_relative_eq!(index.get(2023).unwrap().get(1).unwrap(), 0.430_886_938_006_376_7, epsilon = 1e-9);
        assert_relative_eq!(index.get(2022).unwrap().get(2).unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_pillar_is_an_error() {
        let store = SubIndicatorStore::new();
        assert!(matches!(
            build_global_index(&store, &[2021]),
            Err(PipelineError::MissingSubIndicator { year: 2021, .. })
        ));
    }
}
