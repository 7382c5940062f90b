//! Build the child health index end to end
//!
//! Usage:
//!   cargo run --release --bin build_index [-- --sequential] [-- --from-snapshot]
//!
//! Environment:
//!   CHI_CONFIG    JSON config file (defaults built in when unset)
//!   CHI_DATA_DIR  overrides `paths.data_dir`
//!   RUST_LOG      tracing filter

use anyhow::{Context, Result};
use child_health_index::analysis::{correlation_matrix, fit_mca, ranks_to_frame, taus_to_frame};
use child_health_index::data::write_csv;
use child_health_index::{
    DatasetRegistry, EconomicPanel, GeoReference, IndexPipeline, PipelineConfig, PipelineOutput, QuestionGuide,
};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_config() -> Result<PipelineConfig> {
    let mut config = match std::env::var("CHI_CONFIG") {
        Ok(path) => PipelineConfig::load(Path::new(&path))?,
        Err(_) => PipelineConfig::default(),
    };
    if let Ok(dir) = std::env::var("CHI_DATA_DIR") {
        config.paths.data_dir = PathBuf::from(dir);
    }
    Ok(config)
}

fn write_outputs(output: &PipelineOutput, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create output dir: {:?}", dir))?;

    write_csv(&output.sub_indicators.to_long_frame()?, &dir.join("sub_indicators.csv"))?;
    write_csv(&output.global_index.to_long_frame()?, &dir.join("global_index.csv"))?;
    write_csv(&ranks_to_frame(&output.ranks)?, &dir.join("ranks.csv"))?;
    write_csv(&taus_to_frame(&output.taus)?, &dir.join("kendall_tau.csv"))?;

    let mut years = Vec::new();
    let mut variables = Vec::new();
    let mut loadings = Vec::new();
    let mut weights = Vec::new();
    for synthesis in &output.macro_eco {
        for (i, variable) in synthesis.variables.iter().enumerate() {
            years.push(synthesis.year as u32);
            variables.push(variable.as_str());
            loadings.push(synthesis.loadings[i]);
            weights.push(synthesis.weights[i]);
        }
    }
    let pca = df![
        "year" => years,
        "variable" => variables,
        "loading" => loadings,
        "weight" => weights,
    ]?;
    write_csv(&pca, &dir.join("macro_eco_weights.csv"))?;
    Ok(())
}

fn write_exploratory(config: &PipelineConfig, imputed: &DatasetRegistry, dir: &Path) -> Result<()> {
    let guide = match &config.paths.question_guide {
        Some(path) => Some(QuestionGuide::load_csv(path)?),
        None => None,
    };

    for (year, table) in imputed.iter() {
        let mut mca = fit_mca(year, table, &config.mca.drop_columns, config.mca.n_components)?;
        if let Some(guide) = &guide {
            mca.relabel(guide)?;
        }
        write_csv(&mca.column_coordinates_frame()?, &dir.join(format!("mca_categories_{}.csv", year)))?;

        let split = mca.principal_categories(config.mca.principal_categories);
        let explained = mca.explained_inertia();
        println!("  {} MCA: inertia {:.3}, axes {:?}", year, mca.total_inertia, explained);
        let principal: Vec<&str> = split.principal.iter().map(|c| c.label.as_str()).collect();
        println!("    principal categories: {}", principal.join(", "));

        let correlation = correlation_matrix(table)?;
        write_csv(&correlation.to_frame()?, &dir.join(format!("correlation_{}.csv", year)))?;
    }
    Ok(())
}

fn print_summary(output: &PipelineOutput, geo: &GeoReference) {
    println!("\n{}", "=".repeat(70));
    println!("CHILD HEALTH INDEX");
    println!("{}", "=".repeat(70));

    for synthesis in &output.macro_eco {
        println!(
            "{} macro-economics: first component explains {:.1}% (weights {:?})",
            synthesis.year,
            synthesis.explained_variance_ratio * 100.0,
            synthesis.weights
        );
    }
    println!();

    let mut current = None;
    for row in &output.ranks {
        if current != Some(row.year) {
            current = Some(row.year);
            println!("{} top states:", row.year);
        }
        if row.rank <= 5 {
            let postal = geo.postal_code(row.state).unwrap_or("??");
            println!("  {:>2}. {} {:.4}", row.rank, postal, row.value);
        }
    }
    println!();

    for tau in &output.taus {
        println!(
            "{} tau(global, {:<13}) = {:>6.3}  p = {:.2e}  n = {}",
            tau.year,
            tau.kind.as_str(),
            tau.tau,
            tau.p_value,
            tau.n
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "child_health_index=info,build_index=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let sequential = args.iter().any(|a| a == "--sequential");
    let from_snapshot = args.iter().any(|a| a == "--from-snapshot");

    let config = load_config()?;
    let paths = config.paths.clone();
    let snapshot_dir = paths.output_dir.join("imputed");
    tracing::info!(data_dir = ?paths.data_dir, years = ?config.years, "Configuration loaded");

    let start = Instant::now();
    let geo = GeoReference::load_csv(&paths.geo_reference)?;
    let panel = EconomicPanel::load_csv(&paths.economic_panel, &geo)?;

    let pipeline = IndexPipeline::new(config.clone());
    let output = if from_snapshot {
        let imputed = DatasetRegistry::read_snapshot(&snapshot_dir, &config.years)?;
        pipeline.run_imputed(imputed, &panel)?
    } else {
        let raw = DatasetRegistry::load_raw(&paths.data_dir, &config.years)?;
        let output = if sequential {
            pipeline.run(&raw, &panel)?
        } else {
            pipeline.run_parallel(&raw, &panel)?
        };
        output.imputed.write_snapshot(&snapshot_dir)?;
        output
    };

    write_outputs(&output, &paths.output_dir)?;
    write_exploratory(&config, &output.imputed, &paths.output_dir)?;
    print_summary(&output, &geo);

    println!("\nFinished in {:.2}s, outputs in {:?}", start.elapsed().as_secs_f64(), paths.output_dir);
    Ok(())
}
