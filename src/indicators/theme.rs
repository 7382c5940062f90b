//! Analytical themes and their recoding rules
//!
//! NSCH answers are coded so that 1 is usually the "best" response on ordinal
//! scales and 1 = "Yes" on binary items. Each theme decides how its variables
//! are flipped so that a higher harmonized value always means a better
//! outcome for the child.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Closed set of survey themes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Health,
    MentalHealth,
    MicroEco,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Health, Theme::MentalHealth, Theme::MicroEco];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Health => "health",
            Theme::MentalHealth => "mental_health",
            Theme::MicroEco => "micro_eco",
        }
    }

    /// Recode one categorical (ordinal 1..5) value
    ///
    /// `n_distinct` is the number of distinct observed values of the column in
    /// the table being harmonized. Health keeps the fixed 5-point reversal.
    pub fn recode_categorical(&self, value: f64, n_distinct: usize) -> f64 {
        match self {
            Theme::Health => 6.0 - value,
            Theme::MentalHealth | Theme::MicroEco => (n_distinct as f64 + 1.0) - value,
        }
    }

    /// Recode one binary {1, 2} value
    ///
    /// MicroEco items ask about hardship (1 = "Yes, experienced"), so they map
    /// 1 → 1, 2 → 0; the others map 1 → 0, 2 → 1.
    pub fn recode_binary(&self, value: f64) -> f64 {
        match self {
            Theme::MicroEco => (value - 2.0).abs(),
            Theme::Health | Theme::MentalHealth => value - 1.0,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "health" => Ok(Theme::Health),
            "mental_health" => Ok(Theme::MentalHealth),
            "micro_eco" => Ok(Theme::MicroEco),
            other => Err(PipelineError::UnknownTheme(other.to_string())),
        }
    }
}

/// A theme together with the survey variables that feed it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThemeSpec {
    pub theme: Theme,
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub binary: Vec<String>,
}

impl ThemeSpec {
    pub fn new(theme: Theme, categorical: &[&str], binary: &[&str]) -> Self {
        Self {
            theme,
            categorical: categorical.iter().map(|s| s.to_string()).collect(),
            binary: binary.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Categorical variables first, then binary, as used for bounds and means
    pub fn variables(&self) -> Vec<String> {
        self.categorical.iter().chain(self.binary.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_categorical_is_fixed_reversal() {
        assert_eq!(Theme::Health.recode_categorical(1.0, 3), 5.0);
        assert_eq!(Theme::Health.recode_categorical(5.0, 3), 1.0);
    }

    #[test]
    fn test_other_categorical_uses_cardinality() {
        // 4 distinct answers observed: 1..4 → 4..1
        assert_eq!(Theme::MentalHealth.recode_categorical(1.0, 4), 4.0);
        assert_eq!(Theme::MentalHealth.recode_categorical(4.0, 4), 1.0);
        assert_eq!(Theme::MicroEco.recode_categorical(2.0, 3), 2.0);
    }

    #[test]
    fn test_binary_rules_differ_by_theme() {
        assert_eq!(Theme::MicroEco.recode_binary(1.0), 1.0);
        assert_eq!(Theme::MicroEco.recode_binary(2.0), 0.0);
        assert_eq!(Theme::Health.recode_binary(1.0), 0.0);
        assert_eq!(Theme::Health.recode_binary(2.0), 1.0);
        assert_eq!(Theme::MentalHealth.recode_binary(2.0), 1.0);
    }

    #[test]
    fn test_theme_round_trips_through_str() {
        for theme in Theme::ALL {
            assert_eq!(theme.as_str().parse::<Theme>().unwrap(), theme);
        }
        assert!(matches!("eco".parse::<Theme>(), Err(PipelineError::UnknownTheme(_))));
    }
}
