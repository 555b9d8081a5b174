//! Router configuration generation
//!
//! A firmware entry's `config` object is rendered into UCI configuration
//! files by an external generator. [`ConfigGenerator`] is the seam the
//! materialization step depends on; [`NetJsonConfigCli`] implements it with
//! the `netjsonconfig` command line tool.

use std::future::Future;
use std::process::Stdio;

use serde_yaml::Value;

use crate::error::GeneratorError;

/// A file produced by the configuration generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Absolute destination path inside the image
    pub path: String,
    /// File contents
    pub contents: String,
}

/// Renders a structured configuration into files
pub trait ConfigGenerator: Send + Sync {
    /// Render `config` for the given backend
    fn generate(
        &self,
        backend: &str,
        config: &Value,
    ) -> impl Future<Output = Result<Vec<GeneratedFile>, GeneratorError>> + Send;
}

/// Generator backed by the `netjsonconfig` CLI
#[derive(Debug, Clone)]
pub struct NetJsonConfigCli {
    program: String,
}

impl NetJsonConfigCli {
    /// Use the given program (name on `PATH` or path)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for rendering a JSON config with a backend
    pub fn render_args(backend: &str, config_json: &str) -> Vec<String> {
        vec![
            "--config".to_string(),
            config_json.to_string(),
            "--backend".to_string(),
            backend.to_string(),
            "--method".to_string(),
            "render".to_string(),
        ]
    }
}

impl ConfigGenerator for NetJsonConfigCli {
    async fn generate(
        &self,
        backend: &str,
        config: &Value,
    ) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let config_json = serde_json::to_string(config).map_err(|e| GeneratorError::Serialize {
            error: e.to_string(),
        })?;

        if which::which(&self.program).is_err() {
            return Err(GeneratorError::ProgramNotFound {
                program: self.program.clone(),
            });
        }

        tracing::debug!("Rendering {backend} configuration with {}", self.program);
        let output = tokio::process::Command::new(&self.program)
            .args(Self::render_args(backend, &config_json))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| GeneratorError::Spawn {
                program: self.program.clone(),
                error: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GeneratorError::Failed {
                program: self.program.clone(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let rendered = String::from_utf8_lossy(&output.stdout);
        let files = split_uci_packages(&rendered);
        tracing::debug!("Generator produced {} file(s)", files.len());
        Ok(files)
    }
}

/// Split rendered UCI text into one `/etc/config/<package>` file per package
///
/// Rendered output is a sequence of blocks, each starting with a
/// `package <name>` line. The header line and the blank lines around a block
/// are not part of the file.
pub fn split_uci_packages(rendered: &str) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for line in rendered.lines() {
        if let Some(name) = line.strip_prefix("package ") {
            if let Some(block) = current.take() {
                files.extend(finish_block(block));
            }
            current = Some((name.trim(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            if body.is_empty() && line.trim().is_empty() {
                continue;
            }
            body.push(line);
        }
    }
    if let Some(block) = current {
        files.extend(finish_block(block));
    }

    files
}

fn finish_block((name, mut body): (&str, Vec<&str>)) -> Option<GeneratedFile> {
    if name.is_empty() {
        return None;
    }
    while body.last().is_some_and(|line| line.trim().is_empty()) {
        body.pop();
    }

    let mut contents = body.join("\n");
    contents.push('\n');
    Some(GeneratedFile {
        path: format!("/etc/config/{name}"),
        contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = "package system

config system 'system'
\toption hostname 'office'
\toption timezone 'UTC'

package network

config interface 'loopback'
\toption device 'lo'
\toption proto 'static'

config interface 'lan'
\toption proto 'dhcp'
";

    #[test]
    fn test_split_into_packages() {
        let files = split_uci_packages(RENDERED);

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "/etc/config/system");
        assert_eq!(
            files[0].contents,
            "config system 'system'\n\toption hostname 'office'\n\toption timezone 'UTC'\n"
        );
        assert_eq!(files[1].path, "/etc/config/network");
        assert!(files[1].contents.starts_with("config interface 'loopback'\n"));
        assert!(files[1].contents.contains("\nconfig interface 'lan'\n"));
        assert!(files[1].contents.ends_with("\toption proto 'dhcp'\n"));
    }

    #[test]
    fn test_split_ignores_text_before_first_package() {
        let files = split_uci_packages("# generated\n\npackage wireless\n\nconfig wifi-device 'radio0'\n");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/etc/config/wireless");
        assert_eq!(files[0].contents, "config wifi-device 'radio0'\n");
    }

    #[test]
    fn test_split_empty_output() {
        assert!(split_uci_packages("").is_empty());
        assert!(split_uci_packages("\n\n").is_empty());
    }

    #[test]
    fn test_render_args() {
        let args = NetJsonConfigCli::render_args("openwrt", r#"{"general":{}}"#);
        assert_eq!(
            args,
            vec![
                "--config",
                r#"{"general":{}}"#,
                "--backend",
                "openwrt",
                "--method",
                "render"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let generator = NetJsonConfigCli::new("netjsonconfig-definitely-not-installed");
        let config: Value = serde_yaml::from_str("general: {hostname: x}").unwrap();

        let err = generator.generate("openwrt", &config).await.unwrap_err();

        assert!(matches!(err, GeneratorError::ProgramNotFound { .. }));
    }

    #[cfg(unix)]
    fn write_script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("netjsonconfig");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rendered_output_becomes_config_files() {
        let dir = tempfile::TempDir::new().unwrap();
        // $4 is the backend argument
        let program = write_script(
            &dir,
            "printf 'package system\\n\\nconfig system\\n\\toption hostname %s\\n\\npackage network\\n\\nconfig interface lan\\n' \"$4\"\n",
        );
        let config: Value = serde_yaml::from_str("general: {hostname: x}").unwrap();

        let files = NetJsonConfigCli::new(program)
            .generate("openwrt", &config)
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![
                GeneratedFile {
                    path: "/etc/config/system".to_string(),
                    contents: "config system\n\toption hostname openwrt\n".to_string(),
                },
                GeneratedFile {
                    path: "/etc/config/network".to_string(),
                    contents: "config interface lan\n".to_string(),
                },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_generator_reports_exit_code_and_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(&dir, "echo bad >&2\nexit 3\n");
        let config: Value = serde_yaml::from_str("general: {}").unwrap();

        let err = NetJsonConfigCli::new(program)
            .generate("openwrt", &config)
            .await
            .unwrap_err();

        match &err {
            GeneratorError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(*exit_code, Some(3));
                assert_eq!(stderr, "bad");
            }
            other => panic!("expected a generator failure, got {other:?}"),
        }
        assert!(err.to_string().contains("failed (exit code 3): bad"));
    }
}
