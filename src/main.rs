//! openwrt-composer CLI - Build OpenWRT firmware images from a YAML manifest
//!
//! Entry point for the openwrt-composer command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use openwrt_composer::cli::output::display_error;
use openwrt_composer::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output_config = cli.output_config();

    // RUST_LOG takes precedence over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output_config.log_level().as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "openwrt-composer {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );

    match cli.run().await {
        Ok(report) if report.all_succeeded() => Ok(()),
        Ok(_) => std::process::exit(1),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
