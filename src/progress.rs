//! Progress reporting for the scanner
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::walker::{ScanProgress, ScanResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays scan status
///
/// Clones share the same spinner, so one can be moved into the progress
/// callback while another finishes the display.
#[derive(Clone)]
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScanProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &ScanProgress) -> String {
    format!(
        "Dirs: {} | Files: {} | Size: {} | Classified: {} | Stored: {} | Rate: {:.0}/s | \
         Workers: {}",
        format_number(progress.dirs),
        format_number(progress.files),
        format_size(progress.bytes, BINARY),
        format_number(progress.entries_processed),
        format_number(progress.rows_committed),
        progress.entries_per_second(),
        progress.total_workers,
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the scan results
pub fn print_summary(result: &ScanResult, db_path: &str, db_size: Option<u64>) {
    let duration_secs = result.duration.as_secs_f64();

    println!();
    if result.completed {
        println!("{}", style("Scan Complete").green().bold());
    } else {
        println!("{}", style("Scan Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(result.total_dirs)
    );
    println!("  {} {}", style("Files:").bold(), format_number(result.total_files));
    if result.total_other > 0 {
        println!("  {} {}", style("Other:").bold(), format_number(result.total_other));
    }
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(result.total_bytes, BINARY)
    );
    println!(
        "  {} {}",
        style("Rows Stored:").bold(),
        format_number(result.rows_committed)
    );
    println!(
        "  {} {:.1}s ({:.0} rows/sec)",
        style("Duration:").bold(),
        duration_secs,
        result.rows_per_second()
    );

    let failures = [
        ("Walk Errors:", result.walk_errors),
        ("Unclassified:", result.classify_failures),
        ("Insert Errors:", result.insert_failures),
        ("Busy Retries:", result.commit_retries),
    ];
    for (label, count) in failures {
        if count > 0 {
            println!("  {} {}", style(label).yellow().bold(), format_number(count));
        }
    }

    // Show database path with size if available
    if let Some(size) = db_size {
        let db_size_str = format_size(size, BINARY);
        println!("  {} {} ({})", style("Database:").bold(), db_path, db_size_str);
    } else {
        println!("  {} {}", style("Database:").bold(), db_path);
    }
    println!();
}

/// Print a header at the start of the scan
pub fn print_header(root: &str, workers: usize, mode: &str, output: &str) {
    println!();
    println!(
        "{} {}",
        style("calyx").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Mode:").bold(), mode);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
