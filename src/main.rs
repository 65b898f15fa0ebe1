use std::io;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bgtx::{
    input::{ensure_exist, expand_directories, prompt_for_paths},
    block_on, initialize, summarize, BatchRunner, Config, OnnxLoader,
};

fn main() -> ExitCode {
    let config = Config::new();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<()> {
    // Arguments are checked before the model is loaded; prompted paths after.
    let cli_paths = config.input_paths();
    if !cli_paths.is_empty() {
        ensure_exist(&cli_paths)?;
    }

    let loader = OnnxLoader::from_config(config);
    let session = initialize(&loader, &config.model)?;

    let paths = if cli_paths.is_empty() {
        prompt_for_paths(io::stdin().lock(), io::stdout())?
    } else {
        cli_paths
    };
    let paths = expand_directories(&paths, &config.suffix)?;

    let progress = if config.no_progress || config.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(paths.len() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let started = Instant::now();
    let results = block_on(
        BatchRunner::new(&session, config.process_options())
            .with_concurrency(config.jobs)
            .with_progress(progress.clone())
            .run(&paths),
    )?;
    progress.finish_and_clear();

    let report = summarize(&results);
    info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed = ?started.elapsed(),
        "batch finished"
    );

    if config.json {
        let document = json!({ "report": report, "results": results });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print!("{report}");
    }

    Ok(())
}
