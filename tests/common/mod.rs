//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project directory, sample documents, and in-memory stand-ins for the
//! container engine and the configuration generator.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use openwrt_composer::core::generator::{ConfigGenerator, GeneratedFile};
use openwrt_composer::error::GeneratorError;
use openwrt_composer::infra::container::{ContainerEngine, ContainerError, RunConfig, RunOutput};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write a tool config whose work directory is `<project>/work`
    pub fn write_tool_config(&self) -> PathBuf {
        self.create_file(
            "config.yaml",
            &format!(
                "work_dir: {}\ncontainer_engine: podman\n",
                self.path().join("work").display()
            ),
        );
        self.path().join("config.yaml")
    }

    /// Write a manifest file
    pub fn write_manifest(&self, content: &str) -> PathBuf {
        self.create_file("manifest.yaml", content);
        self.path().join("manifest.yaml")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Two firmwares, one with literal files and package changes
pub const SAMPLE_MANIFEST: &str = r#"
firmwares:
  - target: ath79
    sub_target: generic
    profile: tplink_archer-c7-v5
    version: "23.05.3"
    name: office
    packages:
      add: [luci-ssl, tcpdump]
      remove: [ppp]
    files:
      - path: /etc/motd
        contents: "Welcome to the office router\n"
  - target: x86
    sub_target: "64"
    profile: generic
    version: "23.05.3"
"#;

/// A run recorded by [`FakeEngine`]
#[derive(Debug, Clone)]
pub struct RecordedRun {
    /// Container configuration
    pub config: RunConfig,
    /// Command run in the container
    pub command: Vec<String>,
    /// Timeout requested for the run
    pub timeout: Option<Duration>,
    /// Files visible under the `FILES` mount, relative to it
    pub staged: Vec<PathBuf>,
}

impl RecordedRun {
    /// Value of a `KEY=value` argument of the make command
    pub fn make_var(&self, key: &str) -> Option<&str> {
        let prefix = format!("{key}=");
        self.command
            .iter()
            .find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    /// Host path mounted at a container path
    pub fn host_path(&self, container_path: &str) -> Option<&Path> {
        self.config
            .mounts
            .iter()
            .find(|m| m.container_path == Path::new(container_path))
            .map(|m| m.host_path.as_path())
    }
}

/// In-memory container engine
///
/// Successful runs drop a fake firmware image into the `BIN_DIR` mount.
#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<HashSet<String>>,
    built_images: Mutex<Vec<(PathBuf, String)>>,
    runs: Mutex<Vec<RecordedRun>>,
    failing_profiles: HashSet<String>,
    hanging_profiles: HashSet<String>,
}

impl FakeEngine {
    /// An engine that already has every image
    pub fn with_all_images() -> Self {
        let engine = Self::default();
        engine.images.lock().unwrap().insert("*".to_string());
        engine
    }

    /// Builds of this profile exit with code 1
    pub fn failing(mut self, profile: &str) -> Self {
        self.failing_profiles.insert(profile.to_string());
        self
    }

    /// Builds of this profile time out
    pub fn hanging(mut self, profile: &str) -> Self {
        self.hanging_profiles.insert(profile.to_string());
        self
    }

    /// Recorded runs, in order
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    /// Images built, as (context directory, tag)
    pub fn built_images(&self) -> Vec<(PathBuf, String)> {
        self.built_images.lock().unwrap().clone()
    }
}

impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, tag: &str) -> Result<bool, ContainerError> {
        let images = self.images.lock().unwrap();
        Ok(images.contains("*") || images.contains(tag))
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<RunOutput, ContainerError> {
        assert!(
            context_dir.join("Containerfile").is_file(),
            "build context {} has no Containerfile",
            context_dir.display()
        );
        self.built_images
            .lock()
            .unwrap()
            .push((context_dir.to_path_buf(), tag.to_string()));
        self.images.lock().unwrap().insert(tag.to_string());
        Ok(RunOutput {
            exit_code: Some(0),
            stdout: format!("Successfully tagged {tag}\n"),
            stderr: String::new(),
        })
    }

    async fn run(
        &self,
        config: &RunConfig,
        command: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunOutput, ContainerError> {
        let mut run = RecordedRun {
            config: config.clone(),
            command: command.to_vec(),
            timeout,
            staged: Vec::new(),
        };
        if let Some(files) = run.host_path("/openwrt/files").map(Path::to_path_buf) {
            run.staged = walkdir::WalkDir::new(&files)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().strip_prefix(&files).unwrap().to_path_buf())
                .collect();
            run.staged.sort();
        }

        let profile = run.make_var("PROFILE").unwrap_or_default().to_string();
        let result_dir = run.host_path("/openwrt/result").map(Path::to_path_buf);
        self.runs.lock().unwrap().push(run);

        if self.hanging_profiles.contains(&profile) {
            return Err(ContainerError::TimedOut {
                after: timeout.unwrap_or(Duration::from_secs(1)),
            });
        }
        if self.failing_profiles.contains(&profile) {
            return Ok(RunOutput {
                exit_code: Some(1),
                stdout: "Building images...\n".to_string(),
                stderr: format!("ERROR: profile {profile} not found\n"),
            });
        }

        let result_dir = result_dir.expect("BIN_DIR mount missing");
        std::fs::write(
            result_dir.join(format!("openwrt-{profile}-squashfs-sysupgrade.bin")),
            b"firmware",
        )
        .unwrap();
        std::fs::write(result_dir.join("sha256sums"), b"sums").unwrap();
        Ok(RunOutput {
            exit_code: Some(0),
            stdout: "Building images...\n".to_string(),
            stderr: String::new(),
        })
    }
}

/// Configuration generator returning fixed files
#[derive(Default)]
pub struct FakeGenerator {
    files: Vec<GeneratedFile>,
}

impl FakeGenerator {
    /// Generator producing the given (path, contents) pairs
    pub fn producing(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(path, contents)| GeneratedFile {
                    path: (*path).to_string(),
                    contents: (*contents).to_string(),
                })
                .collect(),
        }
    }
}

impl ConfigGenerator for FakeGenerator {
    async fn generate(
        &self,
        _backend: &str,
        _config: &serde_yaml::Value,
    ) -> Result<Vec<GeneratedFile>, GeneratorError> {
        Ok(self.files.clone())
    }
}
