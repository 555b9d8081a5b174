//! Build command implementation
//!
//! Loads the tool configuration and manifest, then builds every firmware.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::path::PathBuf;

use crate::cli::output::{self, OutputConfig};
use crate::core::compose::{BuildReport, ComposeEvent, ComposeMode, Composer};
use crate::core::generator::NetJsonConfigCli;
use crate::core::image_builder::BuildInvocation;
use crate::core::manifest::Manifest;
use crate::core::tool_config::ToolConfig;
use crate::infra::container::CliEngine;

/// Build options
pub struct BuildOptions {
    /// Tool configuration file
    pub config_file: PathBuf,
    /// Firmware manifest file
    pub manifest_file: PathBuf,
    /// Describe builds instead of running them
    pub dry_run: bool,
}

/// Execute the build
///
/// Both documents are validated before anything is written; entry failures
/// are reported in the returned report rather than as an error.
pub async fn execute(options: &BuildOptions, output: &OutputConfig) -> Result<BuildReport> {
    let config = ToolConfig::load(&options.config_file)?;
    let manifest = Manifest::load(&options.manifest_file)?;

    tracing::info!(
        "Building {} firmware(s) in {}",
        manifest.len(),
        config.work_dir.display()
    );

    // A dry run never talks to the runtime, so it need not be installed
    let engine = if options.dry_run {
        CliEngine::new(config.container_engine)
    } else {
        CliEngine::detect(config.container_engine)?
    }
    .with_remote_url(config.podman_uri());
    let generator = NetJsonConfigCli::new(&config.netjsonconfig_command);
    let mode = if options.dry_run {
        ComposeMode::DryRun
    } else {
        ComposeMode::Build
    };

    let describe = |invocation: &BuildInvocation| {
        let args = engine.build_run_args(&invocation.run_config(), &invocation.command);
        let mut words = vec![engine.runtime().command().to_string()];
        words.extend(args);
        output::shell_join(&words)
    };

    let mut spinner: Option<ProgressBar> = None;
    let report = Composer::new(&config, &engine, &generator)
        .with_mode(mode)
        .run(&manifest, |event| match event {
            ComposeEvent::Started { index, total, spec } => {
                if output.show_progress() {
                    spinner = Some(output::create_spinner(&format!(
                        "[{}/{total}] Building {}",
                        index + 1,
                        spec.summary()
                    )));
                }
            }
            ComposeEvent::Finished(outcome) => {
                if let Some(pb) = spinner.take() {
                    pb.finish_and_clear();
                }
                output::print_outcome(outcome, manifest.len(), output, &describe);
            }
        })
        .await
        .with_context(|| {
            format!(
                "Failed to prepare work directory {}",
                config.work_dir.display()
            )
        })?;

    output::print_summary(&report, output)?;
    Ok(report)
}
