//! File materialization
//!
//! Stages the files of one firmware entry under `<work_dir>/<slug>/files`:
//! literal `files` entries plus whatever the configuration generator renders
//! from `config`. All destinations are resolved before anything is written,
//! so a conflicting entry leaves no partial staging behind.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::generator::ConfigGenerator;
use crate::core::layout::{self, FirmwareLayout};
use crate::core::manifest::FirmwareSpec;
use crate::error::MaterializeError;
use crate::infra::filesystem;

/// Where a staged file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    /// A literal `files` entry
    Literal,
    /// Rendered from `config`
    Generated,
}

/// A file written to the staging directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    /// Absolute destination path inside the image
    pub destination: String,
    /// Location of the staged copy on the host
    pub local_path: PathBuf,
    /// Source of the contents
    pub origin: FileOrigin,
}

/// Files staged for one firmware entry, keyed by destination
#[derive(Debug, Clone)]
pub struct GeneratedFileSet {
    staging_dir: PathBuf,
    files: BTreeMap<String, StagedFile>,
}

impl GeneratedFileSet {
    /// Directory holding the staged tree
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Number of staged files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was staged
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Staged file for a destination path
    pub fn get(&self, destination: &str) -> Option<&StagedFile> {
        self.files.get(destination)
    }

    /// Staged files ordered by destination
    pub fn iter(&self) -> impl Iterator<Item = &StagedFile> {
        self.files.values()
    }
}

struct PlannedFile {
    relative: PathBuf,
    contents: String,
    origin: FileOrigin,
}

/// Stages firmware files under a work directory
pub struct Materializer<'a, G> {
    work_dir: &'a Path,
    generator: &'a G,
}

impl<'a, G: ConfigGenerator> Materializer<'a, G> {
    /// Create a materializer writing below `work_dir`
    pub fn new(work_dir: &'a Path, generator: &'a G) -> Self {
        Self {
            work_dir,
            generator,
        }
    }

    /// Stage the files of one firmware entry
    ///
    /// The staging directory is emptied first, so files from an earlier run
    /// that the entry no longer lists do not leak into the image.
    pub async fn materialize(
        &self,
        spec: &FirmwareSpec,
    ) -> Result<GeneratedFileSet, MaterializeError> {
        let layout = FirmwareLayout::new(self.work_dir, spec);
        let planned = self.plan(spec).await?;

        filesystem::reset_dir(&layout.files_dir)?;

        let mut files = BTreeMap::new();
        for (destination, file) in planned {
            let local_path = layout.files_dir.join(&file.relative);
            filesystem::write_file(&local_path, file.contents.as_bytes())?;
            tracing::trace!("Staged {destination} ({:?})", file.origin);
            files.insert(
                destination.clone(),
                StagedFile {
                    destination,
                    local_path,
                    origin: file.origin,
                },
            );
        }

        tracing::debug!(
            "Staged {} file(s) for {} in {}",
            files.len(),
            spec.slug(),
            layout.files_dir.display()
        );
        Ok(GeneratedFileSet {
            staging_dir: layout.files_dir,
            files,
        })
    }

    async fn plan(
        &self,
        spec: &FirmwareSpec,
    ) -> Result<BTreeMap<String, PlannedFile>, MaterializeError> {
        let mut planned = BTreeMap::new();

        for file in &spec.files {
            let relative = resolve(&file.path)?;
            let destination = layout::display_destination(&relative);
            if planned.contains_key(&destination) {
                return Err(MaterializeError::Conflict { path: destination });
            }
            planned.insert(
                destination,
                PlannedFile {
                    relative,
                    contents: file.contents.clone(),
                    origin: FileOrigin::Literal,
                },
            );
        }

        let Some(config) = &spec.config else {
            return Ok(planned);
        };

        let generated = self.generator.generate(spec.backend_id(), config).await?;
        for file in generated {
            let relative = resolve(&file.path)?;
            let destination = layout::display_destination(&relative);
            match planned.get(&destination).map(|p| p.origin) {
                Some(FileOrigin::Literal) => {
                    return Err(MaterializeError::Conflict { path: destination })
                }
                Some(FileOrigin::Generated) => {
                    return Err(MaterializeError::DuplicateGenerated { path: destination })
                }
                None => {}
            }
            planned.insert(
                destination,
                PlannedFile {
                    relative,
                    contents: file.contents,
                    origin: FileOrigin::Generated,
                },
            );
        }

        Ok(planned)
    }
}

fn resolve(destination: &str) -> Result<PathBuf, MaterializeError> {
    layout::relative_destination(destination).map_err(|reason| MaterializeError::InvalidPath {
        path: destination.to_string(),
        reason,
    })
}
