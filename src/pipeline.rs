//! Index pipeline - coordinates every stage from raw survey tables to ranks
//!
//! Per year (independent of other years):
//!   impute → check → per theme: harmonize → aggregate → normalize
//!   macro-economic synthesis → economic pillar
//! Across years (after every year is done):
//!   global index → rank table → Kendall tau table
//!
//! Includes both sequential and parallel (Rayon, one task per year)
//! implementations.

use rayon::prelude::*;
use tracing::info;

use crate::analysis::{rank_states, tau_table, RankRow, TauRow};
use crate::config::PipelineConfig;
use crate::data::{DatasetRegistry, EconomicPanel, Year};
use crate::error::{PipelineError, Result};
use crate::imputation::{check_imputation, SurveyImputer};
use crate::indicators::{
    build_global_index, insert_economic, synthesize, theme_sub_indicator, GlobalHealthIndex, IndicatorKind,
    MacroSynthesis, SubIndicatorKey, SubIndicatorStore, Theme,
};
use polars::prelude::DataFrame;

/// Everything computed for one survey year
#[derive(Debug, Clone)]
pub struct YearIndicators {
    pub year: Year,
    pub sub_indicators: SubIndicatorStore,
    pub macro_eco: MacroSynthesis,
}

/// Full pipeline result
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub imputed: DatasetRegistry,
    pub sub_indicators: SubIndicatorStore,
    pub macro_eco: Vec<MacroSynthesis>,
    pub global_index: GlobalHealthIndex,
    pub ranks: Vec<RankRow>,
    pub taus: Vec<TauRow>,
}

/// Main pipeline coordinator
pub struct IndexPipeline {
    config: PipelineConfig,
    imputer: SurveyImputer,
}

impl IndexPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let imputer = SurveyImputer::new(config.columns.clone(), config.knn_neighbors, config.baseline_form_code);
        Self { config, imputer }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Impute one year and verify the result
    ///
    /// # Errors
    /// `ImputationIncomplete` if the check fails; the caller must not go on.
    pub fn impute_year(&self, year: Year, raw: &DataFrame) -> Result<DataFrame> {
        let imputed = self.imputer.impute(year, raw)?;
        check_imputation(year, &imputed, &self.config.columns, self.config.baseline_form_code)?;
        Ok(imputed)
    }

    /// Impute every configured year in order
    pub fn impute_all(&self, raw: &DatasetRegistry) -> Result<DatasetRegistry> {
        let mut imputed = DatasetRegistry::new();
        for &year in &self.config.years {
            imputed.insert(year, self.impute_year(year, raw.get(year)?)?);
        }
        Ok(imputed)
    }

    /// Theme sub-indicators, macro synthesis and economic pillar for one year
    pub fn year_indicators(&self, year: Year, imputed: &DataFrame, panel: &EconomicPanel) -> Result<YearIndicators> {
        let mut store = SubIndicatorStore::new();
        for theme in Theme::ALL {
            let spec = self
                .config
                .theme(theme)
                .ok_or(PipelineError::ThemeNotConfigured(theme))?;
            let series = theme_sub_indicator(year, imputed, spec, &self.config.columns)?;
            store.insert(SubIndicatorKey::new(IndicatorKind::from(theme), year), series);
        }

        let variables = panel.variables_for_year(&self.config.economic_indicators, year)?;
        let macro_eco = synthesize(panel, &variables, year)?;
        store.insert(SubIndicatorKey::new(IndicatorKind::MacroEco, year), macro_eco.indicator.clone());
        insert_economic(&mut store, year)?;

        info!(year, series = store.len(), "Built sub-indicators");
        Ok(YearIndicators {
            year,
            sub_indicators: store,
            macro_eco,
        })
    }

    /// Run from imputed tables (e.g. a snapshot) to ranks
    pub fn run_imputed(&self, imputed: DatasetRegistry, panel: &EconomicPanel) -> Result<PipelineOutput> {
        let per_year = self
            .config
            .years
            .iter()
            .map(|&year| self.year_indicators(year, imputed.get(year)?, panel))
            .collect::<Result<Vec<_>>>()?;
        self.assemble(imputed, per_year)
    }

    /// Full sequential run from raw survey tables
    pub fn run(&self, raw: &DatasetRegistry, panel: &EconomicPanel) -> Result<PipelineOutput> {
        let imputed = self.impute_all(raw)?;
        self.run_imputed(imputed, panel)
    }

    /// Full run with years processed in parallel
    ///
    /// Each task owns its year's table; the cross-year joins start only once
    /// every task has returned.
    pub fn run_parallel(&self, raw: &DatasetRegistry, panel: &EconomicPanel) -> Result<PipelineOutput> {
        let results: Vec<(Year, DataFrame, YearIndicators)> = self
            .config
            .years
            .par_iter()
            .map(|&year| -> Result<(Year, DataFrame, YearIndicators)> {
                let imputed = self.impute_year(year, raw.get(year)?)?;
                let indicators = self.year_indicators(year, &imputed, panel)?;
                Ok((year, imputed, indicators))
            })
            .collect::<Result<_>>()?;

        let mut imputed = DatasetRegistry::new();
        let mut per_year = Vec::with_capacity(results.len());
        for (year, table, indicators) in results {
            imputed.insert(year, table);
            per_year.push(indicators);
        }
        self.assemble(imputed, per_year)
    }

    fn ranking_years(&self) -> &[Year] {
        if self.config.ranking_years.is_empty() {
            &self.config.years
        } else {
            &self.config.ranking_years
        }
    }

    fn assemble(&self, imputed: DatasetRegistry, per_year: Vec<YearIndicators>) -> Result<PipelineOutput> {
        let mut sub_indicators = SubIndicatorStore::new();
        let mut macro_eco = Vec::with_capacity(per_year.len());
        for year in per_year {
            sub_indicators.extend(year.sub_indicators);
            macro_eco.push(year.macro_eco);
        }

        let global_index = build_global_index(&sub_indicators, &self.config.years)?;
        let ranks = rank_states(&global_index, self.ranking_years())?;
        let taus = tau_table(&global_index, &sub_indicators, self.ranking_years())?;

        info!(
            years = self.config.years.len(),
            ranked = ranks.len(),
            "Pipeline finished"
        );
        Ok(PipelineOutput {
            imputed,
            sub_indicators,
            macro_eco,
            global_index,
            ranks,
            taus,
        })
    }
}
