pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod destination;
pub mod error;
pub mod header;
pub mod inspect;
pub mod io_utils;
pub mod loader;
pub mod matcher;
pub mod pipeline;
pub mod sanitize;
pub mod schema;
pub mod table;

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands, LoadArgs},
    config::Config,
    error::PipelineError,
    pipeline::{PipelineOptions, RunReport},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Inspect(args) => inspect::execute(&args),
    }
}

fn handle_load(args: &LoadArgs) -> Result<()> {
    let started = Instant::now();
    let outcome = execute_load(args);
    let elapsed = started.elapsed().as_secs_f64();

    let result = match outcome {
        Ok((report, report_path)) => {
            println!();
            println!("RESULTS:");
            println!("Total rows loaded: {}", report.rows_loaded());
            println!("{}: {}", report.question, report.count());
            match report_path {
                Some(path) => write_report(&path, &report, elapsed),
                None => Ok(()),
            }
        }
        Err(err) => {
            error!("Run failed: {err:#}");
            if let Some(rows) = err
                .downcast_ref::<PipelineError>()
                .and_then(PipelineError::rows_loaded_so_far)
            {
                error!("{rows} row(s) had been committed before the failure");
            }
            Err(err)
        }
    };
    info!("Elapsed: {elapsed:.2}s");
    println!("\nTotal execution time: {elapsed:.2} seconds.");
    result
}

fn execute_load(args: &LoadArgs) -> Result<(RunReport, Option<PathBuf>)> {
    let config = Config::from_args(args)?;
    info!(
        "Loading {:?} into {} at {}",
        config.source,
        config.backend,
        config.destination.describe()
    );
    let mut destination = destination::connect(&config.destination)?;
    let report = pipeline::run_pipeline(destination.as_mut(), &PipelineOptions::from_config(&config))?;
    Ok((report, config.report))
}

#[derive(Serialize)]
struct ReportFile<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    elapsed_seconds: f64,
}

fn write_report(path: &Path, report: &RunReport, elapsed_seconds: f64) -> Result<()> {
    let json = serde_json::to_string_pretty(&ReportFile {
        report,
        elapsed_seconds,
    })
    .context("Serializing run report")?;
    fs::write(path, json).with_context(|| format!("Writing run report to {path:?}"))?;
    info!("Run report written to {:?}", path);
    Ok(())
}
