//! OpenWRT Image Builder invocation
//!
//! Every firmware is built by running `make image` inside a container created
//! from a per-release builder image. Builder images derive from a shared base
//! image holding the Image Builder's host dependencies; both are built on
//! demand, and the Image Builder archive is downloaded (and checked against
//! the release's `sha256sums`) the first time a release is needed.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{defaults, urls};
use crate::core::layout::FirmwareLayout;
use crate::core::manifest::FirmwareSpec;
use crate::core::materialize::GeneratedFileSet;
use crate::core::tool_config::ToolConfig;
use crate::error::{BuildError, DownloadError};
use crate::infra::container::{ContainerEngine, ContainerError, MountConfig, RunConfig};
use crate::infra::download::{self, DownloadManager};
use crate::infra::filesystem;

const CONTAINERFILE: &str = "Containerfile";
const ENTRYPOINT_NAME: &str = "entrypoint.sh";
const ENTRYPOINT_SCRIPT: &str = "#!/bin/bash\nset -e\nexec \"$@\"\n";

/// Host packages the Image Builder needs
const BASE_PACKAGES: &[&str] = &[
    "@c-development",
    "@development-tools",
    "@development-libs",
    "zlib-static",
    "which",
    "diffutils",
    "python2",
    "wget",
    "xz",
    "rsync",
    "perl-FindBin",
    "time",
];

/// An Image Builder release for one target/sub-target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuilderRelease {
    /// OpenWRT version
    pub version: String,
    /// Target platform
    pub target: String,
    /// Sub-target
    pub sub_target: String,
}

impl ImageBuilderRelease {
    /// Release a firmware entry is built with
    pub fn for_firmware(spec: &FirmwareSpec) -> Self {
        Self {
            version: spec.version.clone(),
            target: spec.target.clone(),
            sub_target: spec.sub_target.clone(),
        }
    }

    /// Tag of the builder image (image references must be lowercase)
    pub fn image_tag(&self) -> String {
        format!(
            "openwrt-composer-{}-{}-{}",
            self.version, self.target, self.sub_target
        )
        .to_lowercase()
    }

    /// Top-level directory inside the archive
    pub fn archive_dir(&self) -> String {
        format!(
            "openwrt-imagebuilder-{}-{}-{}.{}",
            self.version,
            self.target,
            self.sub_target,
            defaults::IMAGE_BUILDER_HOST
        )
    }

    /// Archive file name
    pub fn archive_file(&self) -> String {
        format!("{}.tar.xz", self.archive_dir())
    }

    /// Release directory on the download server
    pub fn release_url(&self, base_url: &str) -> String {
        format!(
            "{base_url}releases/{}/targets/{}/{}/",
            self.version, self.target, self.sub_target
        )
    }

    /// Archive download URL
    pub fn archive_url(&self, base_url: &str) -> String {
        format!("{}{}", self.release_url(base_url), self.archive_file())
    }

    /// Checksum listing URL
    pub fn sha256sums_url(&self, base_url: &str) -> String {
        format!("{}{}", self.release_url(base_url), urls::SHA256SUMS_FILE)
    }

    /// Build context directory of the builder image
    pub fn context_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir
            .join(&self.version)
            .join(&self.target)
            .join(&self.sub_target)
    }
}

/// Containerfile of the shared base image
pub fn base_containerfile() -> String {
    format!(
        "FROM {from}\n\
         RUN dnf install -y {packages} && dnf clean all\n\
         COPY {ENTRYPOINT_NAME} /usr/local/bin/{ENTRYPOINT_NAME}\n\
         RUN chmod 0755 /usr/local/bin/{ENTRYPOINT_NAME}\n",
        from = defaults::BASE_IMAGE_FROM,
        packages = BASE_PACKAGES.join(" "),
    )
}

/// Containerfile of a release's builder image
pub fn builder_containerfile(release: &ImageBuilderRelease) -> String {
    let archive = release.archive_file();
    let archive_dir = release.archive_dir();
    format!(
        "FROM {base}\n\
         RUN groupadd openwrt && useradd -m -g openwrt openwrt\n\
         RUN mkdir /openwrt && chown openwrt:openwrt /openwrt\n\
         WORKDIR /openwrt\n\
         COPY --chown=openwrt:openwrt {archive} /openwrt/{archive}\n\
         USER openwrt\n\
         RUN tar -xf {archive} && rm {archive}\n\
         WORKDIR /openwrt/{archive_dir}\n\
         ENTRYPOINT [\"/usr/local/bin/{ENTRYPOINT_NAME}\"]\n\
         CMD [\"make\", \"help\"]\n",
        base = defaults::BASE_IMAGE_TAG,
    )
}

/// `make image` command line for a firmware entry
///
/// `PACKAGES` and `FILES` are always passed, even when empty.
pub fn make_command(spec: &FirmwareSpec) -> Vec<String> {
    let mut command = vec![
        "make".to_string(),
        "image".to_string(),
        format!("PROFILE={}", spec.profile),
        format!("BIN_DIR={}", defaults::CONTAINER_RESULT_DIR),
        format!("PACKAGES={}", spec.packages.to_image_builder_list()),
        format!("FILES={}", defaults::CONTAINER_FILES_DIR),
    ];
    if let Some(name) = &spec.name {
        command.push(format!("EXTRA_IMAGE_NAME={name}"));
    }
    command
}

/// A fully described container run for one firmware
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildInvocation {
    /// Builder image
    pub image: String,
    /// Container name
    pub container_name: String,
    /// Host directory mounted as `FILES` (read-only)
    pub files_dir: PathBuf,
    /// Host directory mounted as `BIN_DIR`
    pub output_dir: PathBuf,
    /// Command run in the container
    pub command: Vec<String>,
}

impl BuildInvocation {
    /// Describe the build of a firmware whose files are staged in `files`
    pub fn new(work_dir: &Path, spec: &FirmwareSpec, files: &GeneratedFileSet) -> Self {
        let layout = FirmwareLayout::new(work_dir, spec);
        Self {
            image: ImageBuilderRelease::for_firmware(spec).image_tag(),
            container_name: format!(
                "openwrt-composer-{}-{}",
                spec.slug().to_lowercase(),
                std::process::id()
            ),
            files_dir: files.staging_dir().to_path_buf(),
            output_dir: layout.output_dir,
            command: make_command(spec),
        }
    }

    /// Container run configuration
    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(&self.image)
            .with_name(&self.container_name)
            .with_mount(MountConfig::read_write(
                self.output_dir.clone(),
                PathBuf::from(defaults::CONTAINER_RESULT_DIR),
            ))
            .with_mount(MountConfig::read_only(
                self.files_dir.clone(),
                PathBuf::from(defaults::CONTAINER_FILES_DIR),
            ))
    }
}

/// Files produced by a successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    /// Output directory on the host
    pub output_dir: PathBuf,
    /// Every file the Image Builder wrote, sorted
    pub files: Vec<PathBuf>,
    /// Captured build output
    pub log_file: PathBuf,
}

/// Prepares images and runs the Image Builder through a container engine
pub struct ImageBuilder<'a, E> {
    config: &'a ToolConfig,
    engine: &'a E,
    downloads: DownloadManager,
}

impl<'a, E: ContainerEngine> ImageBuilder<'a, E> {
    /// Create a builder using the given settings and engine
    pub fn new(config: &'a ToolConfig, engine: &'a E) -> Self {
        Self {
            config,
            engine,
            downloads: DownloadManager::new(),
        }
    }

    /// Use a specific download manager
    #[must_use]
    pub fn with_download_manager(mut self, downloads: DownloadManager) -> Self {
        self.downloads = downloads;
        self
    }

    /// Build the base image unless it already exists
    pub async fn ensure_base_image(&self) -> Result<(), BuildError> {
        let tag = defaults::BASE_IMAGE_TAG;
        if self.engine.image_exists(tag).await? {
            tracing::debug!("Image {tag} already exists");
            return Ok(());
        }

        let context_dir = self.config.work_dir.join("base");
        write_context(
            &context_dir,
            &base_containerfile(),
            &[(ENTRYPOINT_NAME, ENTRYPOINT_SCRIPT)],
        )?;
        self.build_image(&context_dir, tag).await
    }

    /// Build a release's builder image unless it already exists
    pub async fn ensure_builder_image(
        &self,
        release: &ImageBuilderRelease,
    ) -> Result<(), BuildError> {
        let tag = release.image_tag();
        if self.engine.image_exists(&tag).await? {
            tracing::debug!("Image {tag} already exists");
            return Ok(());
        }

        let context_dir = release.context_dir(&self.config.work_dir);
        write_context(&context_dir, &builder_containerfile(release), &[])?;
        self.retrieve_archive(release, &context_dir).await?;
        self.build_image(&context_dir, &tag).await
    }

    /// Download the release's Image Builder archive into its context
    /// directory, unless it is already there
    pub async fn retrieve_archive(
        &self,
        release: &ImageBuilderRelease,
        context_dir: &Path,
    ) -> Result<PathBuf, BuildError> {
        let file_name = release.archive_file();
        let archive = context_dir.join(&file_name);
        if archive.is_file() {
            tracing::debug!("Using existing archive {}", archive.display());
            return Ok(archive);
        }

        let base_url = &self.config.openwrt_base_url;
        let expected = match self
            .downloads
            .fetch_text(&release.sha256sums_url(base_url))
            .await?
        {
            Some(listing) => download::lookup_sha256sum(&listing, &file_name),
            None => None,
        };
        if expected.is_none() {
            tracing::warn!("No published checksum for {file_name}; skipping verification");
        }

        let url = release.archive_url(base_url);
        let partial = context_dir.join(format!("{file_name}.part"));
        tracing::info!("Downloading {url}");
        let result = self.downloads.download(&url, &partial).await?;

        if let Some(expected) = expected {
            if result.checksum != expected {
                if let Err(e) = std::fs::remove_file(&partial) {
                    tracing::warn!("Failed to remove {}: {e}", partial.display());
                }
                return Err(DownloadError::ChecksumFailed { file: file_name }.into());
            }
        }

        std::fs::rename(&partial, &archive).map_err(|e| DownloadError::IoError {
            path: archive.clone(),
            error: e.to_string(),
        })?;
        tracing::info!("Downloaded {file_name} ({} bytes)", result.size);
        Ok(archive)
    }

    /// Build one firmware from its staged files
    pub async fn build(
        &self,
        spec: &FirmwareSpec,
        files: &GeneratedFileSet,
    ) -> Result<BuildArtifact, BuildError> {
        let layout = FirmwareLayout::new(&self.config.work_dir, spec);
        let release = ImageBuilderRelease::for_firmware(spec);

        self.ensure_base_image().await?;
        self.ensure_builder_image(&release).await?;

        filesystem::reset_dir(&layout.output_dir)?;
        let invocation = BuildInvocation::new(&self.config.work_dir, spec, files);
        tracing::info!("Running Image Builder for {}", spec.summary());
        tracing::debug!("Command: {}", invocation.command.join(" "));

        let output = match self
            .engine
            .run(
                &invocation.run_config(),
                &invocation.command,
                self.config.build_timeout(),
            )
            .await
        {
            Err(ContainerError::TimedOut { after }) => {
                return Err(BuildError::Timeout {
                    secs: after.as_secs(),
                })
            }
            result => result?,
        };

        let log = output.combined();
        filesystem::write_file(&layout.log_file, &log)?;
        for line in log.lines() {
            tracing::debug!("{line}");
        }

        if !output.success() {
            return Err(BuildError::BuildFailure {
                exit_code: output.exit_code,
                output: log,
            });
        }

        let produced = filesystem::list_files(&layout.output_dir)?;
        tracing::info!(
            "{} produced {} file(s) in {}",
            spec.slug(),
            produced.len(),
            layout.output_dir.display()
        );
        Ok(BuildArtifact {
            output_dir: layout.output_dir,
            files: produced,
            log_file: layout.log_file,
        })
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), BuildError> {
        tracing::info!("Building container image {tag}");
        let output = self.engine.build_image(context_dir, tag).await?;
        if output.success() {
            Ok(())
        } else {
            Err(BuildError::ImageBuild {
                tag: tag.to_string(),
                output: output.combined(),
            })
        }
    }
}

/// Write an image build context, keeping anything else already in it
fn write_context(
    context_dir: &Path,
    containerfile: &str,
    extra: &[(&str, &str)],
) -> Result<(), BuildError> {
    filesystem::create_dir_all(context_dir)?;
    filesystem::write_file(&context_dir.join(CONTAINERFILE), containerfile)?;
    for (name, contents) in extra {
        filesystem::write_file(&context_dir.join(name), contents)?;
    }
    Ok(())
}
