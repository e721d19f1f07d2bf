use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::alignment_tools::blastn_integration::BlastnClient;
use crate::analysis::summary::write_outputs;
use crate::cli::Cli;
use crate::config::{check_database, ScreenConfig};
use crate::data_handling::candidate_table::CandidateTable;
use crate::models::Orientation;
use crate::pipeline::screen_candidates;

mod alignment_tools;
mod analysis;
mod cli;
mod config;
mod data_handling;
mod helper_functions;
mod models;
mod pipeline;
mod screening;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging and project configuration
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting the siRNA specificity screen");

    let config = match &cli.config {
        Some(path) => ScreenConfig::from_json_file(path)?,
        None => ScreenConfig::default(),
    };
    let config = cli.apply(config);
    config.validate()?;

    // Nothing is scheduled unless the database is in place
    let database = config.database();
    check_database(&database)?;
    info!("Using BLAST database {}", database.display());

    let sense = CandidateTable {
        path: cli.sense.clone(),
        orientation: Orientation::Sense,
    }
    .load()
    .with_context(|| format!("cannot load sense candidates from {}", cli.sense.display()))?;
    let antisense = CandidateTable {
        path: cli.antisense.clone(),
        orientation: Orientation::Antisense,
    }
    .load()
    .with_context(|| {
        format!("cannot load antisense candidates from {}", cli.antisense.display())
    })?;

    let client = BlastnClient::from_config(&config)?;
    let run = screen_candidates(&config, &sense, &antisense, &client)?;

    run.summary.log(&run.results);
    write_outputs(&config.output_dir(), &run.results, &run.batch_results, &run.summary)?;

    info!("Screen finished");
    Ok(())
}
