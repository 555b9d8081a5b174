//! Work directory layout
//!
//! ```text
//! <work_dir>/
//!   base/                                  base image build context
//!   <version>/<target>/<sub_target>/       builder image context + archive
//!   <slug>/
//!     files/                               staged files, mounted read-only
//!     firmware/                            Image Builder output
//!     build.log                            output of the last build
//! ```

use std::path::{Component, Path, PathBuf};

use crate::core::manifest::FirmwareSpec;

/// Per-firmware directories under the work directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareLayout {
    /// `<work_dir>/<slug>`
    pub root: PathBuf,
    /// Staged files, mounted as the Image Builder's `FILES` directory
    pub files_dir: PathBuf,
    /// Image Builder `BIN_DIR`
    pub output_dir: PathBuf,
    /// Captured output of the last build
    pub log_file: PathBuf,
}

impl FirmwareLayout {
    /// Layout for a firmware entry
    pub fn new(work_dir: &Path, spec: &FirmwareSpec) -> Self {
        let root = work_dir.join(spec.slug());
        Self {
            files_dir: root.join("files"),
            output_dir: root.join("firmware"),
            log_file: root.join("build.log"),
            root,
        }
    }
}

/// Convert an absolute in-image destination into a path relative to the
/// staging directory
///
/// Rejects relative paths, `..` components, directory-like paths and the
/// root itself. Repeated separators and `.` components are normalized away.
pub fn relative_destination(destination: &str) -> Result<PathBuf, String> {
    if !destination.starts_with('/') {
        return Err("must be an absolute path".to_string());
    }
    if destination.ends_with('/') {
        return Err("must name a file, not a directory".to_string());
    }

    let mut relative = PathBuf::new();
    for component in Path::new(destination).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            Component::ParentDir => return Err("must not contain '..'".to_string()),
            Component::Prefix(_) => return Err("must be a POSIX path".to_string()),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err("must name a file, not '/'".to_string());
    }
    Ok(relative)
}

/// Absolute in-image form of a staging-relative path
pub fn display_destination(relative: &Path) -> String {
    format!("/{}", relative.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::PackagesSpec;
    use proptest::prelude::*;

    #[test]
    fn test_layout_paths() {
        let spec = FirmwareSpec {
            target: "x86".to_string(),
            sub_target: "64".to_string(),
            profile: "generic".to_string(),
            version: "23.05.3".to_string(),
            name: None,
            packages: PackagesSpec::default(),
            files: Vec::new(),
            config: None,
        };

        let layout = FirmwareLayout::new(Path::new("/work"), &spec);

        assert_eq!(layout.root, PathBuf::from("/work/23.05.3-x86-64-generic"));
        assert_eq!(
            layout.files_dir,
            PathBuf::from("/work/23.05.3-x86-64-generic/files")
        );
        assert_eq!(
            layout.output_dir,
            PathBuf::from("/work/23.05.3-x86-64-generic/firmware")
        );
    }

    #[test]
    fn test_relative_destination() {
        assert_eq!(
            relative_destination("/etc/config/network").unwrap(),
            PathBuf::from("etc/config/network")
        );
        assert_eq!(
            relative_destination("/etc//./motd").unwrap(),
            PathBuf::from("etc/motd")
        );
        assert!(relative_destination("etc/motd").is_err());
        assert!(relative_destination("/etc/../passwd").is_err());
        assert!(relative_destination("/").is_err());
        assert!(relative_destination("/etc/").is_err());
        assert!(relative_destination("").is_err());
    }

    proptest! {
        #[test]
        fn prop_destination_round_trips(parts in prop::collection::vec("[a-z0-9_]{1,8}", 1..5)) {
            let destination = format!("/{}", parts.join("/"));
            let relative = relative_destination(&destination).unwrap();

            prop_assert!(relative.is_relative());
            prop_assert_eq!(display_destination(&relative), destination);
        }
    }
}
