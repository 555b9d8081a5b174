//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress spinners,
//! per-firmware results and the final summary.

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::compose::{BuildReport, EntryStatus, FirmwareOutcome};
use crate::core::image_builder::BuildInvocation;
use crate::error::EntryError;

/// Lines of failing build output shown on the terminal
const OUTPUT_TAIL_LINES: usize = 20;

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Output settings chosen on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Only errors and the summary
    pub quiet: bool,
    /// Machine-readable report on stdout
    pub json: bool,
    /// Log verbosity
    pub verbose: u8,
}

impl OutputConfig {
    /// Create output settings
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Whether to draw spinners (they would garble logs and JSON)
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json && self.verbose == 0
    }

    /// Whether to print per-firmware success lines
    pub fn show_success(&self) -> bool {
        !self.quiet && !self.json
    }

    /// Default log level for this verbosity
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, _) => tracing::Level::DEBUG,
        }
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg} {elapsed:.dim}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Print the result of one firmware entry
///
/// `describe` renders a planned build as a command line.
pub fn print_outcome(
    outcome: &FirmwareOutcome,
    total: usize,
    config: &OutputConfig,
    describe: impl Fn(&BuildInvocation) -> String,
) {
    let position = format!("[{}/{total}]", outcome.index + 1);
    match &outcome.result {
        Ok(EntryStatus::Built(artifact)) => {
            if config.show_success() {
                println!(
                    "{} {position} {}: {} file(s) in {}",
                    status::SUCCESS,
                    outcome.summary,
                    artifact.files.len(),
                    artifact.output_dir.display()
                );
            }
        }
        Ok(EntryStatus::Planned(invocation)) => {
            if config.show_success() {
                println!(
                    "{} {position} {}: {} file(s) staged in {}",
                    status::INFO,
                    outcome.summary,
                    outcome.staged_files,
                    invocation.files_dir.display()
                );
                println!("    {}", describe(invocation));
            }
        }
        Err(e) => {
            if config.json {
                return;
            }
            eprintln!(
                "{} {position} {}: {}: {e}",
                status::ERROR,
                outcome.summary,
                e.kind()
            );
            if let Some(tail) = failure_output(e) {
                for line in tail {
                    eprintln!("    | {line}");
                }
            }
        }
    }
}

/// Print the final summary (or the JSON report)
pub fn print_summary(report: &BuildReport, config: &OutputConfig) -> anyhow::Result<()> {
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        return Ok(());
    }

    let total = report.outcomes.len();
    if report.all_succeeded() {
        println!("{} {total} of {total} firmware(s) succeeded", status::SUCCESS);
    } else {
        println!(
            "{} {} of {total} firmware(s) failed",
            status::ERROR,
            report.failed()
        );
        for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
            println!("    - {}", outcome.slug);
        }
    }
    Ok(())
}

/// Print a fatal error and its causes
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Join words into a command line a POSIX shell would split back the same way
pub fn shell_join(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            let plain = !word.is_empty()
                && word
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
            if plain {
                word.clone()
            } else {
                format!("'{}'", word.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn failure_output(error: &EntryError) -> Option<Vec<&str>> {
    let EntryError::Build(build) = error else {
        return None;
    };
    let lines: Vec<&str> = build.output()?.lines().collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    Some(lines[skip..].to_vec())
}
