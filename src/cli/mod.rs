//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::core::compose::BuildReport;
use commands::build::{self, BuildOptions};
use output::OutputConfig;

/// openwrt-composer - Build OpenWRT firmware images from a YAML manifest
///
/// Stages configuration files for every firmware listed in the manifest and
/// runs the OpenWRT Image Builder for each of them in a container.
#[derive(Parser, Debug)]
#[command(name = "openwrt-composer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tool configuration (work directory, download mirror, container engine)
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: PathBuf,

    /// Firmware manifest listing the images to build
    #[arg(value_name = "MANIFEST_FILE")]
    pub manifest_file: PathBuf,

    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and the final summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Output the build report as JSON
    #[arg(long)]
    pub json: bool,

    /// Stage files and print the Image Builder commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Output settings selected on the command line
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig::new(self.quiet, self.json, self.verbose)
    }

    /// Run the build
    pub async fn run(self) -> Result<BuildReport> {
        let output = self.output_config();
        let options = BuildOptions {
            config_file: self.config_file,
            manifest_file: self.manifest_file,
            dry_run: self.dry_run,
        };
        build::execute(&options, &output).await
    }
}
