//! Error types for openwrt-composer
//!
//! Domain-specific error types using thiserror.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::infra::container::ContainerError;

/// A single problem found in a YAML document, located by its field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path to the offending field, e.g. `firmwares[1].target`
    pub path: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration and manifest validation errors
///
/// These are fatal for the whole run and are reported before any build starts.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Document could not be read
    #[error("Failed to read '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Document is not valid YAML
    #[error("Invalid YAML in {document}: {error}")]
    Syntax { document: String, error: String },

    /// Document is valid YAML but has missing or mistyped fields
    #[error("{document} is invalid:\n{}", format_field_errors(.errors))]
    Fields {
        document: String,
        errors: Vec<FieldError>,
    },
}

impl ValidationError {
    /// Field errors carried by this error (empty for read/syntax errors)
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ValidationError::Fields { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Whether any field error points at the given path
    pub fn mentions(&self, path: &str) -> bool {
        self.field_errors().iter().any(|e| e.path == path)
    }
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Errors from the configuration-generation collaborator
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Generator program is not installed
    #[error("Configuration generator '{program}' not found in PATH")]
    ProgramNotFound { program: String },

    /// Config object could not be handed to the generator
    #[error("Config cannot be converted to JSON: {error}")]
    Serialize { error: String },

    /// Generator ran but reported failure
    #[error("Configuration generator '{program}' failed (exit code {}): {stderr}", display_code(.exit_code))]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Generator could not be started
    #[error("Failed to run configuration generator '{program}': {error}")]
    Spawn { program: String, error: String },
}

/// Errors staging the files of one firmware entry
#[derive(Error, Debug)]
pub enum MaterializeError {
    /// IO failure while writing staged files
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// `files` and `config` both produce the same destination
    #[error("Destination '{path}' is produced by both `files` and `config`")]
    Conflict { path: String },

    /// Generator produced the same destination twice
    #[error("Configuration generator produced '{path}' more than once")]
    DuplicateGenerated { path: String },

    /// Destination path cannot be staged
    #[error("Invalid destination path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Configuration generator failed
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}'")]
    ChecksumFailed { file: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Max retries exceeded
    #[error("Download failed after {retries} retries: {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },
}

/// Errors preparing images for, or running, the Image Builder
#[derive(Error, Debug)]
pub enum BuildError {
    /// Image Builder exited non-zero
    #[error("Image Builder exited with code {}", display_code(.exit_code))]
    BuildFailure {
        exit_code: Option<i32>,
        output: String,
    },

    /// Image Builder did not finish in time
    #[error("Image Builder did not finish within {secs}s and was stopped")]
    Timeout { secs: u64 },

    /// Container image build failed
    #[error("Failed to build container image '{tag}'")]
    ImageBuild { tag: String, output: String },

    /// Image Builder archive could not be retrieved
    #[error("Failed to retrieve Image Builder archive: {0}")]
    Retrieval(#[from] DownloadError),

    /// Container runtime error
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl BuildError {
    /// Captured output of the failing process, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            BuildError::BuildFailure { output, .. } | BuildError::ImageBuild { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}

/// Failure of a single firmware entry
///
/// Entry failures never stop the remaining entries from being processed.
#[derive(Error, Debug)]
pub enum EntryError {
    /// Staging configuration files failed
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// Building the firmware failed
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl EntryError {
    /// Short name of the error kind, as shown in reports
    pub fn kind(&self) -> &'static str {
        match self {
            EntryError::Materialize(MaterializeError::Filesystem(_)) => "IOError",
            EntryError::Materialize(
                MaterializeError::Conflict { .. } | MaterializeError::DuplicateGenerated { .. },
            ) => "ConflictError",
            EntryError::Materialize(MaterializeError::InvalidPath { .. }) => "InvalidPath",
            EntryError::Materialize(MaterializeError::Generator(_)) => "GeneratorError",
            EntryError::Build(BuildError::BuildFailure { .. }) => "BuildFailure",
            EntryError::Build(BuildError::Timeout { .. }) => "Timeout",
            EntryError::Build(BuildError::Filesystem(_)) => "IOError",
            EntryError::Build(_) => "ImageError",
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "<signal>".to_string(), |c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_are_listed() {
        let err = ValidationError::Fields {
            document: "manifest 'm.yaml'".to_string(),
            errors: vec![
                FieldError::new("firmwares[0].target", "missing required field"),
                FieldError::new("firmwares[1].version", "expected a string, got a number"),
            ],
        };

        let msg = err.to_string();
        assert!(msg.contains("firmwares[0].target: missing required field"));
        assert!(msg.contains("firmwares[1].version"));
        assert!(err.mentions("firmwares[0].target"));
        assert!(!err.mentions("firmwares[0].profile"));
    }

    #[test]
    fn test_build_failure_message_has_exit_code() {
        let err = BuildError::BuildFailure {
            exit_code: Some(2),
            output: "make: *** [image] Error 2".to_string(),
        };
        assert_eq!(err.to_string(), "Image Builder exited with code 2");
        assert_eq!(err.output(), Some("make: *** [image] Error 2"));

        let killed = BuildError::BuildFailure {
            exit_code: None,
            output: String::new(),
        };
        assert!(killed.to_string().contains("<signal>"));
    }

    #[test]
    fn test_entry_error_kinds() {
        let conflict: EntryError = MaterializeError::Conflict {
            path: "/etc/config/network".to_string(),
        }
        .into();
        assert_eq!(conflict.kind(), "ConflictError");

        let io: EntryError = MaterializeError::Filesystem(FilesystemError::WriteFile {
            path: PathBuf::from("/tmp/x"),
            error: "denied".to_string(),
        })
        .into();
        assert_eq!(io.kind(), "IOError");

        let build: EntryError = BuildError::BuildFailure {
            exit_code: Some(1),
            output: String::new(),
        }
        .into();
        assert_eq!(build.kind(), "BuildFailure");
    }
}
