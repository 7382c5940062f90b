//! Pipeline configuration
//!
//! Analysis settings live in a JSON file (years, theme variable lists, column
//! names, data paths). Anything absent from the file falls back to the NSCH
//! defaults in [`PipelineConfig::default`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::Year;
use crate::indicators::{Theme, ThemeSpec};

/// Column names shared by every survey year
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SurveyColumns {
    pub state: String,
    pub weight: String,
    pub form_type: String,
    /// Height and weight: only measured for non-baseline form types
    pub anthropometric: [String; 2],
}

impl Default for SurveyColumns {
    fn default() -> Self {
        Self {
            state: "FIPSST".to_string(),
            weight: "FWC".to_string(),
            form_type: "FORMTYPE".to_string(),
            anthropometric: ["HEIGHT".to_string(), "WEIGHT".to_string()],
        }
    }
}

/// Where inputs are read from and outputs written to
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub geo_reference: PathBuf,
    pub economic_panel: PathBuf,
    pub question_guide: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            geo_reference: PathBuf::from("data/cb_2024_us_state_20m.csv"),
            economic_panel: PathBuf::from("data/SAGDP1__ALL_AREAS_1997_2024.csv"),
            question_guide: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Settings for the multiple correspondence analysis
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct McaSettings {
    pub n_components: usize,
    pub drop_columns: Vec<String>,
    pub principal_categories: usize,
}

impl Default for McaSettings {
    fn default() -> Self {
        Self {
            n_components: 2,
            drop_columns: vec![
                "FIPSST".to_string(),
                "FWC".to_string(),
                "FORMTYPE".to_string(),
                "HEIGHT".to_string(),
                "WEIGHT".to_string(),
            ],
            principal_categories: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub years: Vec<Year>,
    /// Years reported in the ranking table, taken as written; empty means
    /// every year in `years`
    pub ranking_years: Vec<Year>,
    pub themes: Vec<ThemeSpec>,
    pub columns: SurveyColumns,
    pub knn_neighbors: usize,
    pub baseline_form_code: i64,
    /// BEA line descriptions fed to the macro-economic synthesizer
    pub economic_indicators: Vec<String>,
    pub mca: McaSettings,
    pub paths: DataPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            years: vec![2021, 2022, 2023, 2024],
            ranking_years: Vec::new(),
            themes: vec![
                ThemeSpec::new(
                    Theme::Health,
                    &["K2Q01", "K2Q01_D"],
                    &["K2Q40A", "K2Q61A", "K2Q42A", "K4Q28X04"],
                ),
                ThemeSpec::new(
                    Theme::MentalHealth,
                    &["K7Q84_R", "K7Q85_R", "K7Q70_R", "K8Q31"],
                    &["K2Q31A", "K2Q32A", "K2Q33A", "K2Q34A"],
                ),
                ThemeSpec::new(
                    Theme::MicroEco,
                    &["FPL_I1", "K8Q21"],
                    &["K11Q60", "K11Q61", "K11Q62"],
                ),
            ],
            columns: SurveyColumns::default(),
            knn_neighbors: 3,
            baseline_form_code: 1,
            economic_indicators: vec![
                "Real GDP (millions of chained 2017 dollars)".to_string(),
                "Per capita real GDP (chained 2017 dollars)".to_string(),
                "Current-dollar GDP (millions of current dollars)".to_string(),
                "Per capita personal income (dollars)".to_string(),
            ],
            mca: McaSettings::default(),
            paths: DataPaths::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;

        if config.knn_neighbors == 0 {
            anyhow::bail!("knn_neighbors must be at least 1");
        }
        for kind in [Theme::Health, Theme::MentalHealth, Theme::MicroEco] {
            if !config.themes.iter().any(|t| t.theme == kind) {
                anyhow::bail!("Theme '{}' has no variable list in {:?}", kind, path);
            }
        }

        Ok(config)
    }

    pub fn theme(&self, theme: Theme) -> Option<&ThemeSpec> {
        self.themes.iter().find(|t| t.theme == theme)
    }
}
