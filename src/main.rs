//! calyx - Parallel Filesystem Classifier
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use calyx::config::{CliArgs, ScanConfig};
use calyx::progress::{print_header, print_summary, ProgressReporter};
use calyx::walker::ScanCoordinator;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    // Print header
    if config.show_progress {
        print_header(
            &config.root.display().to_string(),
            config.worker_count,
            config.write_mode.as_str(),
            &config.output_path.display().to_string(),
        );
    }

    let output_path = config.output_path.clone();
    let show_progress = config.show_progress;
    let coordinator = ScanCoordinator::new(config);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Run the scan
    let result = if show_progress {
        let progress = ProgressReporter::new();
        progress.set_status("Starting scan...");

        let reporter = progress.clone();
        let result = coordinator.run_with_progress(move |p| reporter.update(&p));

        match &result {
            Ok(r) if r.completed => progress.finish("Scan completed"),
            Ok(_) => progress.finish("Scan interrupted"),
            Err(_) => progress.finish_and_clear(),
        }
        result
    } else {
        coordinator.run()
    }
    .context("Scan failed")?;

    // Print summary
    let db_size = std::fs::metadata(&output_path).ok().map(|m| m.len());
    print_summary(&result, &output_path.display().to_string(), db_size);

    // Report success/failure
    if !result.completed {
        info!("Scan was interrupted before completion");
    }

    let errors = result.walk_errors + result.classify_failures + result.insert_failures;
    if errors > 0 {
        info!(
            walk_errors = result.walk_errors,
            classify_failures = result.classify_failures,
            insert_failures = result.insert_failures,
            "Scan completed with errors"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("calyx=debug,warn")
    } else {
        EnvFilter::new("calyx=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
