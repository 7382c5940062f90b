//! Indicator construction
//!
//! Stage order for one theme and year:
//! `harmonize` → `aggregate_by_state` → `TheoreticalBounds` +
//! `normalize_sub_indicator`. The economic pillar also takes the
//! `macro_eco::synthesize` output, and `composite` joins the pillars into the
//! global index.

pub mod theme;
pub mod series;
pub mod harmonize;
pub mod aggregate;
pub mod normalize;
pub mod macro_eco;
pub mod composite;

// Re-export stage functions and types
pub use theme::{Theme, ThemeSpec};
pub use series::{GlobalHealthIndex, IndicatorKind, SubIndicator, SubIndicatorKey, SubIndicatorStore};
pub use harmonize::{harmonize, HarmonizedTable};
pub use aggregate::{aggregate_by_state, StateAggregate};
pub use normalize::{normalize_sub_indicator, TheoreticalBounds};
pub use macro_eco::{standard_normal_cdf, synthesize, MacroSynthesis};
pub use composite::{build_global_index, combine_economic, geometric_mean_index, insert_economic};

use crate::config::SurveyColumns;
use crate::data::Year;
use crate::error::Result;
use polars::prelude::DataFrame;

/// Harmonize, aggregate and normalize one theme of one year's table
pub fn theme_sub_indicator(
    year: Year,
    df: &DataFrame,
    spec: &ThemeSpec,
    columns: &SurveyColumns,
) -> Result<SubIndicator> {
    let table = harmonize(year, df, spec, columns)?;
    let bounds = TheoreticalBounds::from_table(&table)?;
    let aggregate = aggregate_by_state(&table)?;
    normalize_sub_indicator(&aggregate, bounds)
}
