//! Firmware manifest parsing and validation
//!
//! The manifest lists the firmware images to build. Each entry names an
//! Image Builder release (version, target, sub-target), a device profile,
//! package changes, literal files and an optional structured router
//! configuration that is rendered into UCI files.
//!
//! Validation runs over the whole document and reports every problem at once,
//! each located by its field path (e.g. `firmwares[1].target`).

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::defaults;
use crate::core::layout;
use crate::core::validate::{self, field_path, Validator};
use crate::error::{FieldError, ValidationError};

const FIRMWARE_KEYS: &[&str] = &[
    "target",
    "sub_target",
    "profile",
    "version",
    "name",
    "packages",
    "files",
    "config",
];

/// The firmware manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Firmware entries, built in order
    pub firmwares: Vec<FirmwareSpec>,
}

/// One firmware image to build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FirmwareSpec {
    /// OpenWRT target platform, e.g. `ath79`
    pub target: String,

    /// OpenWRT sub-target, e.g. `generic`
    pub sub_target: String,

    /// Device profile, e.g. `tplink_archer-c7-v5`
    pub profile: String,

    /// OpenWRT release version, e.g. `23.05.3`
    pub version: String,

    /// Optional label, passed to the Image Builder as `EXTRA_IMAGE_NAME`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Packages to add to and remove from the profile defaults
    #[serde(default)]
    pub packages: PackagesSpec,

    /// Literal files to place in the image
    #[serde(default)]
    pub files: Vec<FileSpec>,

    /// Structured router configuration rendered into `/etc/config/*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// Package changes relative to the profile's defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackagesSpec {
    /// Packages to install
    #[serde(default)]
    pub add: Vec<String>,

    /// Packages to leave out
    #[serde(default)]
    pub remove: Vec<String>,
}

impl PackagesSpec {
    /// Package list in Image Builder syntax: additions, then `-`-prefixed removals
    pub fn to_image_builder_list(&self) -> String {
        self.add
            .iter()
            .cloned()
            .chain(self.remove.iter().map(|p| format!("-{p}")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A literal file placed in the image at an absolute path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSpec {
    /// Absolute destination path inside the image
    pub path: String,

    /// Exact file contents
    pub contents: String,
}

/// Fields that together identify a firmware entry
type Identity<'a> = (&'a str, &'a str, &'a str, &'a str, Option<&'a str>);

impl FirmwareSpec {
    /// Name of this entry's directory under the work directory
    ///
    /// The explicit name when given, otherwise
    /// `<version>-<target>-<sub_target>-<profile>`.
    pub fn slug(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!(
                "{}-{}-{}-{}",
                self.version, self.target, self.sub_target, self.profile
            )
        })
    }

    /// Backend identifier handed to the configuration generator
    pub fn backend_id(&self) -> &'static str {
        defaults::CONFIG_BACKEND
    }

    /// One-line description for progress output
    pub fn summary(&self) -> String {
        let label = self
            .name
            .as_deref()
            .map(|n| format!(" [{n}]"))
            .unwrap_or_default();
        format!(
            "{}/{} {} (OpenWRT {}){label}",
            self.target, self.sub_target, self.profile, self.version
        )
    }

    fn identity(&self) -> Identity<'_> {
        (
            &self.target,
            &self.sub_target,
            &self.profile,
            &self.version,
            self.name.as_deref(),
        )
    }
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| ValidationError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        tracing::debug!("Loading manifest from {}", path.display());
        Self::from_yaml(&content, &format!("manifest '{}'", path.display()))
    }

    /// Parse and validate manifest text
    pub fn from_yaml(content: &str, document: &str) -> Result<Self, ValidationError> {
        let tree = validate::parse_document(content, document)?;
        validate_tree(&tree, document)?;

        let manifest: Manifest =
            serde_yaml::from_value(tree).map_err(|e| ValidationError::Syntax {
                document: document.to_string(),
                error: e.to_string(),
            })?;

        let duplicates = manifest.duplicate_errors();
        if !duplicates.is_empty() {
            return Err(ValidationError::Fields {
                document: document.to_string(),
                errors: duplicates,
            });
        }

        tracing::debug!("Manifest lists {} firmware(s)", manifest.firmwares.len());
        Ok(manifest)
    }

    /// Number of firmware entries
    pub fn len(&self) -> usize {
        self.firmwares.len()
    }

    /// Whether the manifest lists no firmware
    pub fn is_empty(&self) -> bool {
        self.firmwares.is_empty()
    }

    /// Entries that describe the same build, or would share a staging directory
    fn duplicate_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let mut identities: HashMap<Identity<'_>, usize> = HashMap::new();
        let mut slugs: HashMap<String, usize> = HashMap::new();

        for (i, firmware) in self.firmwares.iter().enumerate() {
            let path = format!("firmwares[{i}]");
            if let Some(first) = identities.insert(firmware.identity(), i) {
                errors.push(FieldError::new(
                    path,
                    format!(
                        "duplicates firmwares[{first}] (same target, sub_target, profile, version and name)"
                    ),
                ));
                continue;
            }
            if let Some(first) = slugs.insert(firmware.slug(), i) {
                errors.push(FieldError::new(
                    path,
                    format!(
                        "work directory '{}' is also used by firmwares[{first}]; set a distinct `name`",
                        firmware.slug()
                    ),
                ));
            }
        }

        errors
    }
}

fn is_package_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").unwrap())
        .is_match(name)
}

fn validate_tree(tree: &Value, document: &str) -> Result<(), ValidationError> {
    let mut v = Validator::new();

    let root = match tree {
        Value::Mapping(map) => map,
        other => {
            v.mistyped("<root>", "a mapping with a `firmwares` list", other);
            return v.finish(document);
        }
    };
    Validator::warn_unknown_keys(root, "", &["firmwares"]);

    match root.get("firmwares") {
        None | Some(Value::Null) => v.error("firmwares", "missing required field"),
        Some(Value::Sequence(entries)) if entries.is_empty() => {
            v.error("firmwares", "must list at least one firmware");
        }
        Some(Value::Sequence(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                let path = format!("firmwares[{i}]");
                match entry {
                    Value::Mapping(map) => validate_firmware(&mut v, map, &path),
                    other => v.mistyped(path, "a mapping", other),
                }
            }
        }
        Some(other) => v.mistyped("firmwares", "a list", other),
    }

    v.finish(document)
}

fn validate_firmware(v: &mut Validator, map: &Mapping, path: &str) {
    Validator::warn_unknown_keys(map, path, FIRMWARE_KEYS);

    for key in ["target", "sub_target", "profile", "version"] {
        if let Some(Value::Number(n)) = map.get(key) {
            v.error(
                field_path(path, key),
                format!("expected a string, got the number {n}; quote it, e.g. {key}: \"{n}\""),
            );
            continue;
        }
        if let Some(value) = v.required_string(map, path, key) {
            check_identifier(v, &field_path(path, key), value);
        }
    }

    if let Some(name) = v.optional_string(map, path, "name") {
        check_identifier(v, &field_path(path, "name"), name);
    }

    if let Some(packages) = v.optional_mapping(map, path, "packages") {
        let packages_path = field_path(path, "packages");
        Validator::warn_unknown_keys(packages, &packages_path, &["add", "remove"]);
        for key in ["add", "remove"] {
            for (item_path, package) in v.string_list(packages, &packages_path, key) {
                if !is_package_name(package) {
                    v.error(
                        item_path,
                        format!("'{package}' is not a valid package name"),
                    );
                }
            }
        }
    }

    if let Some(files) = v.optional_sequence(map, path, "files") {
        validate_files(v, files, &field_path(path, "files"));
    }

    if let Some(config) = map.get("config") {
        if !matches!(config, Value::Null | Value::Mapping(_)) {
            v.mistyped(field_path(path, "config"), "a mapping", config);
        }
    }
}

fn validate_files(v: &mut Validator, files: &[Value], path: &str) {
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();

    for (i, file) in files.iter().enumerate() {
        let file_path = format!("{path}[{i}]");
        let Value::Mapping(map) = file else {
            v.mistyped(file_path, "a mapping with `path` and `contents`", file);
            continue;
        };
        Validator::warn_unknown_keys(map, &file_path, &["path", "contents"]);

        v.required_string(map, &file_path, "contents");
        let Some(destination) = v.required_string(map, &file_path, "path") else {
            continue;
        };

        match layout::relative_destination(destination) {
            Ok(relative) => {
                if let Some(first) = seen.insert(relative, i) {
                    v.error(
                        field_path(&file_path, "path"),
                        format!("'{destination}' is already listed at {path}[{first}]"),
                    );
                }
            }
            Err(reason) => v.error(field_path(&file_path, "path"), reason),
        }
    }
}

fn check_identifier(v: &mut Validator, path: &str, value: &str) {
    if !validate::is_identifier(value) {
        v.error(
            path,
            format!(
                "'{value}' must start with a letter or digit and contain only letters, digits, '.', '_' and '-'"
            ),
        );
    }
}
