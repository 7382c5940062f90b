//! Pipeline Integration Tests
//!
//! Runs the full index pipeline on seeded synthetic survey years and a small
//! economic panel, then checks the cross-stage guarantees: completeness after
//! imputation, inner-join drops, rank ties and snapshot round-trips.

use approx::assert_relative_eq;
use child_health_index::analysis::competition_ranks;
use child_health_index::config::SurveyColumns;
use child_health_index::imputation::check_imputation;
use child_health_index::{
    DatasetRegistry, EconomicPanel, IndexPipeline, IndicatorKind, PipelineConfig, PipelineError, Theme, ThemeSpec,
};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const YEARS: [u16; 2] = [2022, 2023];
const SURVEY_STATES: [u32; 4] = [1, 2, 4, 5];
const PANEL_STATES: [u32; 3] = [1, 2, 4];

fn maybe(rng: &mut StdRng, value: f64, missing: f64) -> Option<f64> {
    if rng.gen_bool(missing) {
        None
    } else {
        Some(value)
    }
}

/// 30 children per state; theme columns ~5% missing, anthropometrics only
/// asked on forms T2/T3
fn survey_year(seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = SURVEY_STATES.len() * 30;

    let mut state = Vec::with_capacity(rows);
    let mut weight = Vec::with_capacity(rows);
    let mut form = Vec::with_capacity(rows);
    let mut height = Vec::with_capacity(rows);
    let mut body_weight = Vec::with_capacity(rows);
    let mut themed: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();

    for r in 0..rows {
        let s = SURVEY_STATES[r % SURVEY_STATES.len()];
        state.push(s as f64);
        weight.push(rng.gen_range(50.0..500.0));
        let code = rng.gen_range(1..=3);
        form.push(format!("T{code}"));
        if code == 1 {
            height.push(None);
            body_weight.push(None);
        } else {
            let h = rng.gen_range(100.0..180.0);
            height.push(maybe(&mut rng, h, 0.2));
            let w = h * 0.3 + rng.gen_range(-5.0..5.0);
            body_weight.push(maybe(&mut rng, w, 0.2));
        }

        for (name, max) in [("H1", 5), ("M1", 4), ("E1", 4), ("H2", 2), ("M2", 2), ("E2", 2)] {
            // Healthier states answer lower codes more often
            let shift = if s == 1 { 0 } else { rng.gen_range(0..=1) };
            let v = (rng.gen_range(1..=max) + shift).min(max) as f64;
            let cell = maybe(&mut rng, v, 0.05);
            themed.entry(name).or_default().push(cell);
        }
    }

    let mut columns = vec![
        Column::new("FIPSST".into(), state),
        Column::new("FWC".into(), weight),
        Column::new("FORMTYPE".into(), form),
        Column::new("HEIGHT".into(), height),
        Column::new("WEIGHT".into(), body_weight),
    ];
    for (name, values) in themed {
        columns.push(Column::new(name.into(), values));
    }
    DataFrame::new(columns).unwrap()
}

fn panel() -> EconomicPanel {
    let mut columns = BTreeMap::new();
    let mut frame_columns = vec![Column::new("FIPSST".into(), PANEL_STATES.to_vec())];
    for (i, year) in YEARS.iter().enumerate() {
        let shift = i as f64 * 10.0;
        let gdp = vec![300.0 + shift, 120.0 + shift, 80.0 + shift];
        let per_capita = vec![70.0 + shift, 55.0 + shift, 61.0 + shift];
        for (name, values) in [("gdp", gdp), ("per_capita", per_capita)] {
            let column = EconomicPanel::column_name(name, *year);
            frame_columns.push(Column::new(column.as_str().into(), values));
            columns.insert((name.to_string(), *year), column);
        }
    }
    EconomicPanel::new(DataFrame::new(frame_columns).unwrap(), columns).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        years: YEARS.to_vec(),
        ranking_years: YEARS.to_vec(),
        themes: vec![
            ThemeSpec::new(Theme::Health, &["H1"], &["H2"]),
            ThemeSpec::new(Theme::MentalHealth, &["M1"], &["M2"]),
            ThemeSpec::new(Theme::MicroEco, &["E1"], &["E2"]),
        ],
        economic_indicators: vec!["gdp".to_string(), "per_capita".to_string()],
        ..PipelineConfig::default()
    }
}

fn registry() -> DatasetRegistry {
    let mut raw = DatasetRegistry::new();
    for (i, year) in YEARS.iter().enumerate() {
        raw.insert(*year, survey_year(100 + i as u64));
    }
    raw
}

#[test]
fn test_full_run_produces_complete_tables_and_index() {
    let pipeline = IndexPipeline::new(config());
    let output = pipeline.run(&registry(), &panel()).unwrap();

    for year in YEARS {
        let table = output.imputed.get(year).unwrap();
        let report = check_imputation(year, table, &SurveyColumns::default(), 1).unwrap();
        assert!(report.is_complete());
        for name in ["H1", "M1", "E1", "H2", "M2", "E2", "FWC", "FIPSST"] {
            assert_eq!(table.column(name).unwrap().null_count(), 0, "{name} in {year}");
        }
        // Baseline rows keep missing measurements
        assert!(table.column("HEIGHT").unwrap().null_count() > 0);
        assert!(table.column("HEIGHT_imputed").is_ok());
    }

    for year in YEARS {
        let health = output.sub_indicators.get(IndicatorKind::Health, year).unwrap();
        assert_eq!(health.len(), SURVEY_STATES.len());

        // State 5 has no economic data, so it drops out of the global index
        let global = output.global_index.get(year).unwrap();
        assert_eq!(global.states().collect::<Vec<_>>(), PANEL_STATES.to_vec());
        assert!(output.sub_indicators.get(IndicatorKind::Economic, year).unwrap().get(5).is_none());

        for (state, value) in global.iter() {
            let mental = output.sub_indicators.get(IndicatorKind::MentalHealth, year).unwrap().get(state).unwrap();
            let health = health.get(state).unwrap();
            let eco = output.sub_indicators.get(IndicatorKind::Economic, year).unwrap().get(state).unwrap();
            assert_relative_eq!(value, (mental * health * eco).powf(1.0 / 3.0), epsilon = 1e-12);
        }
    }

    for synthesis in &output.macro_eco {
        assert_relative_eq!(synthesis.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(synthesis.indicator.values().all(|v| v > 0.0 && v < 1.0));
    }
}

#[test]
fn test_ranks_and_taus_cover_ranking_years() {
    let pipeline = IndexPipeline::new(config());
    let output = pipeline.run(&registry(), &panel()).unwrap();

    assert_eq!(output.ranks.len(), YEARS.len() * PANEL_STATES.len());
    for year in YEARS {
        let block: Vec<_> = output.ranks.iter().filter(|r| r.year == year).collect();
        let values: Vec<f64> = block.iter().map(|r| r.value).collect();
        let expected = competition_ranks(&values);
        assert_eq!(block.iter().map(|r| r.rank).collect::<Vec<_>>(), expected);
        assert_eq!(block[0].rank, 1);
        assert!(block.iter().all(|r| r.value <= block[0].value));
    }

    assert_eq!(output.taus.len(), YEARS.len() * IndicatorKind::PILLARS.len());
    for tau in &output.taus {
        assert_eq!(tau.n, PANEL_STATES.len());
        assert!(tau.tau.is_nan() || (-1.0..=1.0).contains(&tau.tau));
    }
}

#[test]
fn test_parallel_run_matches_sequential() {
    let pipeline = IndexPipeline::new(config());
    let raw = registry();
    let sequential = pipeline.run(&raw, &panel()).unwrap();
    let parallel = pipeline.run_parallel(&raw, &panel()).unwrap();

    for year in YEARS {
        let a = sequential.global_index.get(year).unwrap();
        let b = parallel.global_index.get(year).unwrap();
        assert_eq!(a.len(), b.len());
        for (state, value) in a.iter() {
            assert_relative_eq!(value, b.get(state).unwrap(), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_snapshot_round_trip_reproduces_index() {
    let pipeline = IndexPipeline::new(config());
    let first = pipeline.run(&registry(), &panel()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    first.imputed.write_snapshot(dir.path()).unwrap();
    let restored = DatasetRegistry::read_snapshot(dir.path(), &YEARS).unwrap();
    let second = pipeline.run_imputed(restored, &panel()).unwrap();

    for year in YEARS {
        let a = first.global_index.get(year).unwrap();
        let b = second.global_index.get(year).unwrap();
        for (state, value) in a.iter() {
            assert_relative_eq!(value, b.get(state).unwrap(), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_missing_year_halts_pipeline() {
    let mut cfg = config();
    cfg.years.push(2024);
    let pipeline = IndexPipeline::new(cfg);
    assert!(matches!(
        pipeline.run(&registry(), &panel()),
        Err(PipelineError::MissingYear(2024))
    ));
}

#[test]
fn test_config_without_ranking_years_ranks_computed_years() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "years": [2022, 2023],
            "themes": [
                {"theme": "health", "categorical": ["H1"], "binary": ["H2"]},
                {"theme": "mental_health", "categorical": ["M1"], "binary": ["M2"]},
                {"theme": "micro_eco", "categorical": ["E1"], "binary": ["E2"]}
            ],
            "economic_indicators": ["gdp", "per_capita"]
        }"#,
    )
    .unwrap();

    let cfg = PipelineConfig::load(&path).unwrap();
    assert!(cfg.ranking_years.is_empty());

    let output = IndexPipeline::new(cfg).run(&registry(), &panel()).unwrap();
    let mut ranked: Vec<u16> = output.ranks.iter().map(|r| r.year).collect();
    ranked.dedup();
    assert_eq!(ranked, YEARS.to_vec());
    assert_eq!(output.taus.len(), YEARS.len() * IndicatorKind::PILLARS.len());
}
