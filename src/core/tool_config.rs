//! Tool configuration
//!
//! The tool configuration file holds settings for openwrt-composer itself
//! (where to work, where to download Image Builder archives from and which
//! container engine to drive), as opposed to the manifest that describes the
//! firmwares to build. A few settings can be overridden with
//! `OPENWRT_COMPOSER_*` environment variables.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{defaults, urls};
use crate::core::validate::{self, Validator};
use crate::error::{FieldError, ValidationError};
use crate::infra::container::ContainerRuntime;

const KNOWN_KEYS: &[&str] = &[
    "work_dir",
    "openwrt_base_url",
    "container_engine",
    "podman",
    "build_timeout_secs",
    "netjsonconfig_command",
];

/// Settings that may be supplied through the environment, by field name
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("work_dir", "WORK_DIR"),
    ("openwrt_base_url", "OPENWRT_BASE_URL"),
    ("container_engine", "CONTAINER_ENGINE"),
];

/// Podman-specific settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodmanConfig {
    /// Remote service URI, passed to podman as `--url`
    pub uri: String,
}

/// Resolved tool configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfig {
    /// Absolute work directory holding images contexts, staging and output
    pub work_dir: PathBuf,
    /// Root of the OpenWRT download server, always ending in `/`
    pub openwrt_base_url: String,
    /// Container engine used for image builds and firmware builds
    pub container_engine: ContainerRuntime,
    /// Podman settings
    pub podman: Option<PodmanConfig>,
    /// Per-firmware build timeout; `None` waits indefinitely
    pub build_timeout_secs: Option<u64>,
    /// Configuration-generation program
    pub netjsonconfig_command: String,
}

#[derive(Debug, Deserialize)]
struct RawToolConfig {
    #[serde(default)]
    work_dir: Option<PathBuf>,
    #[serde(default)]
    openwrt_base_url: Option<String>,
    #[serde(default)]
    container_engine: Option<ContainerRuntime>,
    #[serde(default)]
    podman: Option<PodmanConfig>,
    #[serde(default = "default_build_timeout")]
    build_timeout_secs: Option<u64>,
    #[serde(default)]
    netjsonconfig_command: Option<String>,
}

fn default_base_url() -> String {
    urls::OPENWRT_DOWNLOADS.to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_build_timeout() -> Option<u64> {
    Some(defaults::BUILD_TIMEOUT_SECS)
}

fn default_netjsonconfig() -> String {
    defaults::NETJSONCONFIG_COMMAND.to_string()
}

impl ToolConfig {
    /// Defaults for a given work directory
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            openwrt_base_url: default_base_url(),
            container_engine: ContainerRuntime::default(),
            podman: None,
            build_timeout_secs: default_build_timeout(),
            netjsonconfig_command: default_netjsonconfig(),
        }
    }

    /// Load the tool configuration from a file, applying environment overrides
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| ValidationError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let cwd = std::env::current_dir().map_err(|e| ValidationError::Read {
            path: PathBuf::from("."),
            error: e.to_string(),
        })?;

        tracing::debug!("Loading tool config from {}", path.display());
        Self::from_yaml(
            &content,
            &format!("tool config '{}'", path.display()),
            &cwd,
            |name| std::env::var(name).ok(),
        )
    }

    /// Parse and validate tool configuration text
    ///
    /// `cwd` anchors the default and relative work directories; `env` looks
    /// up override variables by their full name.
    pub fn from_yaml(
        content: &str,
        document: &str,
        cwd: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        let mut map = match validate::parse_document(content, document)? {
            Value::Null => Mapping::new(),
            Value::Mapping(map) => map,
            other => {
                return Err(ValidationError::Fields {
                    document: document.to_string(),
                    errors: vec![FieldError::new(
                        "<root>",
                        format!("expected a mapping, got {}", validate::type_name(&other)),
                    )],
                })
            }
        };

        for (field, suffix) in ENV_OVERRIDES {
            let var = format!("{}{suffix}", defaults::ENV_PREFIX);
            if let Some(value) = env(&var) {
                tracing::debug!("{var} overrides '{field}'");
                map.insert(Value::from(*field), Value::from(value));
            }
        }

        validate_tree(&map, document)?;

        let raw: RawToolConfig =
            serde_yaml::from_value(Value::Mapping(map)).map_err(|e| ValidationError::Syntax {
                document: document.to_string(),
                error: e.to_string(),
            })?;

        Ok(raw.resolve(cwd))
    }

    /// Build timeout as a duration
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }

    /// Remote service URI for podman, if configured
    pub fn podman_uri(&self) -> Option<String> {
        self.podman.as_ref().map(|p| p.uri.clone())
    }
}

impl RawToolConfig {
    fn resolve(self, cwd: &Path) -> ToolConfig {
        let work_dir = match self.work_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => cwd.join(dir),
            None => cwd.join(defaults::WORK_DIR_NAME),
        };

        let mut openwrt_base_url = self.openwrt_base_url.unwrap_or_else(default_base_url);
        if !openwrt_base_url.ends_with('/') {
            openwrt_base_url.push('/');
        }

        ToolConfig {
            work_dir,
            openwrt_base_url,
            container_engine: self.container_engine.unwrap_or_default(),
            podman: self.podman,
            build_timeout_secs: self.build_timeout_secs,
            netjsonconfig_command: self
                .netjsonconfig_command
                .unwrap_or_else(default_netjsonconfig),
        }
    }
}

fn validate_tree(map: &Mapping, document: &str) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    Validator::warn_unknown_keys(map, "", KNOWN_KEYS);

    if let Some(dir) = v.optional_string(map, "", "work_dir") {
        if dir.trim().is_empty() {
            v.error("work_dir", "must not be empty");
        }
    }

    if let Some(url) = v.optional_string(map, "", "openwrt_base_url") {
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => v.error(
                "openwrt_base_url",
                format!("unsupported scheme '{}', expected http or https", parsed.scheme()),
            ),
            Err(e) => v.error("openwrt_base_url", format!("not a valid URL: {e}")),
        }
    }

    if let Some(engine) = v.optional_string(map, "", "container_engine") {
        if ContainerRuntime::from_name(engine).is_none() {
            v.error(
                "container_engine",
                format!("unknown container engine '{engine}', expected podman or docker"),
            );
        }
    }

    if let Some(podman) = v.optional_mapping(map, "", "podman") {
        Validator::warn_unknown_keys(podman, "podman", &["uri"]);
        if let Some(uri) = v.required_string(podman, "podman", "uri") {
            if uri.trim().is_empty() {
                v.error("podman.uri", "must not be empty");
            }
        }
    }

    match map.get("build_timeout_secs") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) if n.as_u64().is_some_and(|secs| secs > 0) => {}
        Some(other) => v.error(
            "build_timeout_secs",
            format!(
                "expected a positive number of seconds or null, got {}",
                validate::type_name(other)
            ),
        ),
    }

    if let Some(command) = v.optional_string(map, "", "netjsonconfig_command") {
        if command.trim().is_empty() {
            v.error("netjsonconfig_command", "must not be empty");
        }
    }

    v.finish(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(yaml: &str) -> Result<ToolConfig, ValidationError> {
        ToolConfig::from_yaml(yaml, "tool config", Path::new("/srv/build"), no_env)
    }

    // ============================================
    // Unit Tests
    // ============================================

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/srv/build/openwrt-composer"));
        assert_eq!(config.openwrt_base_url, "https://downloads.openwrt.org/");
        assert_eq!(config.container_engine, ContainerRuntime::Podman);
        assert_eq!(config.podman, None);
        assert_eq!(config.build_timeout(), Some(Duration::from_secs(7200)));
        assert_eq!(config.netjsonconfig_command, "netjsonconfig");
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r"
work_dir: /var/tmp/composer
openwrt_base_url: https://mirror.example.org/openwrt
container_engine: docker
podman:
  uri: unix:///run/podman/podman.sock
build_timeout_secs: 600
netjsonconfig_command: /opt/netjsonconfig/bin/netjsonconfig
",
        )
        .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/composer"));
        assert_eq!(config.openwrt_base_url, "https://mirror.example.org/openwrt/");
        assert_eq!(config.container_engine, ContainerRuntime::Docker);
        assert_eq!(
            config.podman_uri().as_deref(),
            Some("unix:///run/podman/podman.sock")
        );
        assert_eq!(config.build_timeout_secs, Some(600));
        assert_eq!(
            config.netjsonconfig_command,
            "/opt/netjsonconfig/bin/netjsonconfig"
        );
    }

    #[test]
    fn test_relative_work_dir_is_anchored_at_cwd() {
        let config = parse("work_dir: out/images\n").unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/srv/build/out/images"));
    }

    #[test]
    fn test_null_timeout_disables_it() {
        let config = parse("build_timeout_secs: null\n").unwrap();
        assert_eq!(config.build_timeout(), None);
    }

    #[test]
    fn test_all_errors_are_reported() {
        let err = parse(
            r"
openwrt_base_url: ftp://downloads.openwrt.org/
container_engine: lxc
podman: {}
build_timeout_secs: soon
",
        )
        .unwrap_err();

        assert!(err.mentions("openwrt_base_url"));
        assert!(err.mentions("container_engine"));
        assert!(err.mentions("podman.uri"));
        assert!(err.mentions("build_timeout_secs"));
        assert_eq!(err.field_errors().len(), 4);
    }

    #[test]
    fn test_non_mapping_root_is_rejected() {
        let err = parse("- podman\n").unwrap_err();
        assert!(err.mentions("<root>"));
    }

    #[test]
    fn test_invalid_yaml_is_syntax_error() {
        let err = parse("work_dir: [unterminated\n").unwrap_err();
        assert!(matches!(err, ValidationError::Syntax { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("OPENWRT_COMPOSER_WORK_DIR", "/data/composer"),
            ("OPENWRT_COMPOSER_CONTAINER_ENGINE", "docker"),
        ]
        .into_iter()
        .collect();

        let config = ToolConfig::from_yaml(
            "work_dir: /tmp/ignored\ncontainer_engine: podman\n",
            "tool config",
            Path::new("/"),
            |name| env.get(name).map(|v| (*v).to_string()),
        )
        .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/data/composer"));
        assert_eq!(config.container_engine, ContainerRuntime::Docker);
    }

    #[test]
    fn test_env_override_is_validated() {
        let err = ToolConfig::from_yaml("", "tool config", Path::new("/"), |name| {
            (name == "OPENWRT_COMPOSER_CONTAINER_ENGINE").then(|| "rkt".to_string())
        })
        .unwrap_err();
        assert!(err.mentions("container_engine"));
    }
}
