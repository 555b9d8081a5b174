//! Build pipeline
//!
//! Processes manifest entries one after another: stage files, then build
//! (or, in dry-run mode, describe the build). A failing entry is recorded and
//! the remaining entries still run; the caller decides the overall outcome
//! from the returned [`BuildReport`].

use serde_json::json;

use crate::core::generator::ConfigGenerator;
use crate::core::image_builder::{BuildArtifact, BuildInvocation, ImageBuilder};
use crate::core::manifest::{FirmwareSpec, Manifest};
use crate::core::materialize::Materializer;
use crate::core::tool_config::ToolConfig;
use crate::error::{EntryError, FilesystemError};
use crate::infra::container::ContainerEngine;
use crate::infra::download::DownloadManager;
use crate::infra::filesystem;

/// Whether entries are actually built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComposeMode {
    /// Stage files and run the Image Builder
    #[default]
    Build,
    /// Stage files and describe the Image Builder run without starting it
    DryRun,
}

/// What happened to a successful entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryStatus {
    /// Firmware was built
    Built(BuildArtifact),
    /// Dry run: the build that would have run
    Planned(BuildInvocation),
}

/// Result of processing one manifest entry
#[derive(Debug)]
pub struct FirmwareOutcome {
    /// Position in the manifest
    pub index: usize,
    /// Work directory name of the entry
    pub slug: String,
    /// One-line description of the entry
    pub summary: String,
    /// Number of files staged for the image
    pub staged_files: usize,
    /// Entry result
    pub result: Result<EntryStatus, EntryError>,
}

impl FirmwareOutcome {
    /// Whether the entry succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "index": self.index,
            "slug": self.slug,
            "summary": self.summary,
            "staged_files": self.staged_files,
        });
        match &self.result {
            Ok(EntryStatus::Built(artifact)) => {
                value["status"] = json!("built");
                value["artifact"] = json!(artifact);
            }
            Ok(EntryStatus::Planned(invocation)) => {
                value["status"] = json!("planned");
                value["invocation"] = json!(invocation);
            }
            Err(e) => {
                value["status"] = json!("failed");
                value["error"] = json!({ "kind": e.kind(), "message": e.to_string() });
            }
        }
        value
    }
}

/// Outcomes of a whole run, in manifest order
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Per-entry outcomes
    pub outcomes: Vec<FirmwareOutcome>,
}

impl BuildReport {
    /// Number of successful entries
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed entries
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every entry succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Machine-readable form of the report
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "firmwares": self.outcomes.iter().map(FirmwareOutcome::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Progress notifications emitted while running
#[derive(Debug)]
pub enum ComposeEvent<'a> {
    /// An entry is about to be processed
    Started {
        /// Position in the manifest
        index: usize,
        /// Number of entries in the manifest
        total: usize,
        /// The entry
        spec: &'a FirmwareSpec,
    },
    /// An entry finished
    Finished(&'a FirmwareOutcome),
}

/// Runs the pipeline over a manifest
pub struct Composer<'a, E, G> {
    config: &'a ToolConfig,
    engine: &'a E,
    generator: &'a G,
    mode: ComposeMode,
    downloads: DownloadManager,
}

impl<'a, E: ContainerEngine, G: ConfigGenerator> Composer<'a, E, G> {
    /// Create a composer
    pub fn new(config: &'a ToolConfig, engine: &'a E, generator: &'a G) -> Self {
        Self {
            config,
            engine,
            generator,
            mode: ComposeMode::default(),
            downloads: DownloadManager::new(),
        }
    }

    /// Set the mode
    #[must_use]
    pub fn with_mode(mut self, mode: ComposeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a specific download manager for Image Builder archives
    #[must_use]
    pub fn with_download_manager(mut self, downloads: DownloadManager) -> Self {
        self.downloads = downloads;
        self
    }

    /// Process every entry of the manifest in order
    ///
    /// Only failing to create the work directory aborts the run; entry
    /// failures are recorded in the report.
    pub async fn run(
        &self,
        manifest: &Manifest,
        mut on_event: impl FnMut(ComposeEvent<'_>),
    ) -> Result<BuildReport, FilesystemError> {
        filesystem::create_dir_all(&self.config.work_dir)?;

        let total = manifest.len();
        let mut report = BuildReport::default();
        for (index, spec) in manifest.firmwares.iter().enumerate() {
            on_event(ComposeEvent::Started { index, total, spec });
            let outcome = self.compose_one(index, spec).await;

            match &outcome.result {
                Ok(_) => tracing::info!("[{}/{total}] {} done", index + 1, outcome.slug),
                Err(e) => tracing::info!("[{}/{total}] {} failed: {e}", index + 1, outcome.slug),
            }

            on_event(ComposeEvent::Finished(&outcome));
            report.outcomes.push(outcome);
        }

        tracing::info!("{} of {total} firmware(s) succeeded", report.succeeded());
        Ok(report)
    }

    /// Process a single entry
    pub async fn compose_one(&self, index: usize, spec: &FirmwareSpec) -> FirmwareOutcome {
        let (staged_files, result) = self.process(spec).await;
        FirmwareOutcome {
            index,
            slug: spec.slug(),
            summary: spec.summary(),
            staged_files,
            result,
        }
    }

    async fn process(&self, spec: &FirmwareSpec) -> (usize, Result<EntryStatus, EntryError>) {
        let files = match Materializer::new(&self.config.work_dir, self.generator)
            .materialize(spec)
            .await
        {
            Ok(files) => files,
            Err(e) => return (0, Err(e.into())),
        };

        let result = match self.mode {
            ComposeMode::DryRun => Ok(EntryStatus::Planned(BuildInvocation::new(
                &self.config.work_dir,
                spec,
                &files,
            ))),
            ComposeMode::Build => ImageBuilder::new(self.config, self.engine)
                .with_download_manager(self.downloads.clone())
                .build(spec, &files)
                .await
                .map(EntryStatus::Built)
                .map_err(EntryError::from),
        };
        (files.len(), result)
    }
}
