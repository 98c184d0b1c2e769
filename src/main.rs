//! Series Linker CLI
//!
//! A command-line tool that links unordered TV episode files into a clean
//! `Show (Year)/Season NN/Show SNNEMM.ext` tree, using an AI classifier with a
//! filename heuristic as fallback.

use clap::Parser;
use series_linker::cli::{
    args::{Cli, Commands},
    commands::{apply, apply_overrides, preview, rollback, status},
};
use series_linker::models::config::{load_config, Config};
use series_linker::preflight;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        if e.is_run_fatal() {
            use colored::Colorize;
            eprintln!("{}", "[FATAL] Run aborted before any change was applied.".red().bold());
        }
        return Err(e.into());
    }

    Ok(())
}

/// Dispatch the parsed command.
async fn run(cli: Cli) -> series_linker::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Preview { scan, json } => {
            let config = apply_overrides(config, &scan)?;
            if !cli.skip_preflight && !json {
                run_preflight_checks(&config).await;
            }
            preview::preview(&config, &scan, json).await?;
        }

        Commands::Apply { scan, yes } => {
            let config = apply_overrides(config, &scan)?;
            if !cli.skip_preflight {
                run_preflight_checks(&config).await;
            }
            apply::apply(&config, &scan, yes).await?;
        }

        Commands::Rollback {
            show,
            target,
            dry_run,
        } => {
            let mut config = config;
            if let Some(target) = target {
                config.target_root = target;
            }
            config.absolutize()?;
            rollback::rollback(&config, show.as_deref(), dry_run).await?;
        }

        Commands::Status { source, target } => {
            let mut config = config;
            if let Some(source) = source {
                config.source_root = source;
            }
            if let Some(target) = target {
                config.target_root = target;
            }
            config.absolutize()?;
            status::status(&config).await?;
        }
    }

    Ok(())
}

/// Initialize the logging system.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("series_linker=debug")
    } else {
        EnvFilter::new("series_linker=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

/// Run preflight checks. Failures are printed but do not stop the run.
async fn run_preflight_checks(config: &Config) {
    use colored::Colorize;

    println!("{}", "Running preflight checks...".bold());
    println!();

    let results = preflight::run_preflight_checks(config).await;
    preflight::print_results(&results);

    println!();

    if !preflight::all_passed(&results) {
        println!(
            "{}",
            "[WARN] Some preflight checks failed; continuing anyway.".yellow()
        );
        println!();
    }
}
