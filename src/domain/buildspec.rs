//! Build specifications for the containerized build service.
//!
//! The serialized shape is fixed by the build service:
//!
//! ```yaml
//! version: "0.2"
//! phases:
//!   install:
//!     runtime-versions: { nodejs: "12" }
//!     commands: [...]
//!   build:
//!     commands: [...]
//! artifacts:
//!   base-directory: ./public
//!   files: ["**/*"]
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Build spec schema version understood by the build service
pub const BUILDSPEC_VERSION: &str = "0.2";

/// A complete build specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    pub phases: Phases,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactsSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallPhase>,
    pub build: BuildPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallPhase {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime_versions: BTreeMap<String, String>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPhase {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtifactsSection {
    pub base_directory: String,
    pub files: Vec<String>,
}

/// Static-site build settings.
///
/// Install commands run in the order given. The default sequence updates
/// the package manager, installs the generator CLI, installs the
/// dependency manager and resolves dependencies, so the generator exists
/// before the build phase invokes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteBuild {
    #[serde(default = "default_runtime_versions")]
    pub runtime_versions: BTreeMap<String, String>,

    #[serde(default = "default_install_commands")]
    pub install_commands: Vec<String>,

    #[serde(default = "default_build_commands")]
    pub build_commands: Vec<String>,

    #[serde(default = "default_base_directory")]
    pub base_directory: String,

    #[serde(default = "default_files")]
    pub files: Vec<String>,
}

fn default_runtime_versions() -> BTreeMap<String, String> {
    [("nodejs".to_string(), "12".to_string())].into_iter().collect()
}

fn default_install_commands() -> Vec<String> {
    vec![
        "npm install -g npm".to_string(),
        "npm install -g gatsby-cli".to_string(),
        "npm install -g yarn".to_string(),
        "yarn install".to_string(),
    ]
}

fn default_build_commands() -> Vec<String> {
    vec!["gatsby build".to_string()]
}

fn default_base_directory() -> String {
    "./public".to_string()
}

fn default_files() -> Vec<String> {
    vec!["**/*".to_string()]
}

impl Default for SiteBuild {
    fn default() -> Self {
        Self {
            runtime_versions: default_runtime_versions(),
            install_commands: default_install_commands(),
            build_commands: default_build_commands(),
            base_directory: default_base_directory(),
            files: default_files(),
        }
    }
}

/// Build spec validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildSpecError {
    #[error("Build phase has no commands")]
    NoBuildCommands,

    #[error("Artifact base directory is empty")]
    EmptyBaseDirectory,

    #[error("Artifact file list is empty")]
    NoArtifactFiles,

    #[error("Invalid artifact file glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },
}

impl BuildSpec {
    /// Build spec for the static-site build project
    pub fn site(build: &SiteBuild) -> Self {
        let install = if build.install_commands.is_empty() && build.runtime_versions.is_empty() {
            None
        } else {
            Some(InstallPhase {
                runtime_versions: build.runtime_versions.clone(),
                commands: build.install_commands.clone(),
            })
        };

        Self {
            version: BUILDSPEC_VERSION.to_string(),
            phases: Phases {
                install,
                build: BuildPhase {
                    commands: build.build_commands.clone(),
                },
            },
            artifacts: Some(ArtifactsSection {
                base_directory: build.base_directory.clone(),
                files: build.files.clone(),
            }),
        }
    }

    /// Build spec for the cache invalidation job.
    ///
    /// The distribution id is read from `env_var` at run time; the job
    /// produces no artifacts.
    pub fn invalidation(env_var: &str) -> Self {
        Self {
            version: BUILDSPEC_VERSION.to_string(),
            phases: Phases {
                install: None,
                build: BuildPhase {
                    commands: vec![format!(
                        "aws cloudfront create-invalidation --distribution-id ${{{}}} --paths \"/*\"",
                        env_var
                    )],
                },
            },
            artifacts: None,
        }
    }

    pub fn validate(&self) -> Result<(), BuildSpecError> {
        if self.phases.build.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(BuildSpecError::NoBuildCommands);
        }

        if let Some(artifacts) = &self.artifacts {
            if artifacts.base_directory.trim().is_empty() {
                return Err(BuildSpecError::EmptyBaseDirectory);
            }
            if artifacts.files.is_empty() {
                return Err(BuildSpecError::NoArtifactFiles);
            }
            for pattern in &artifacts.files {
                Pattern::new(pattern).map_err(|e| BuildSpecError::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// JSON string embedded in the build project
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize build spec")
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse build spec YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_install_order_preserved() {
        let spec = BuildSpec::site(&SiteBuild::default());
        let install = spec.phases.install.as_ref().unwrap();

        assert_eq!(
            install.commands,
            vec![
                "npm install -g npm",
                "npm install -g gatsby-cli",
                "npm install -g yarn",
                "yarn install",
            ]
        );
        assert_eq!(spec.phases.build.commands, vec!["gatsby build"]);
        assert_eq!(install.runtime_versions.get("nodejs"), Some(&"12".to_string()));
    }

    #[test]
    fn test_wire_shape_uses_kebab_case_keys() {
        let spec = BuildSpec::site(&SiteBuild::default());
        let value: serde_json::Value = serde_json::from_str(&spec.to_json_string().unwrap()).unwrap();

        assert_eq!(value["version"], "0.2");
        assert!(value["phases"]["install"]["runtime-versions"].is_object());
        assert_eq!(value["artifacts"]["base-directory"], "./public");
        assert_eq!(value["artifacts"]["files"][0], "**/*");
        assert_eq!(value["artifacts"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_invalidation_spec() {
        let spec = BuildSpec::invalidation("CLOUDFRONT_ID");
        assert!(spec.artifacts.is_none());
        assert!(spec.phases.install.is_none());
        assert_eq!(
            spec.phases.build.commands,
            vec!["aws cloudfront create-invalidation --distribution-id ${CLOUDFRONT_ID} --paths \"/*\""]
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut build = SiteBuild {
            build_commands: Vec::new(),
            ..Default::default()
        };
        assert_eq!(
            BuildSpec::site(&build).validate(),
            Err(BuildSpecError::NoBuildCommands)
        );

        build.build_commands = default_build_commands();
        build.files = vec!["[".to_string()];
        assert!(matches!(
            BuildSpec::site(&build).validate(),
            Err(BuildSpecError::InvalidGlob { .. })
        ));

        build.files = default_files();
        build.base_directory = " ".to_string();
        assert_eq!(
            BuildSpec::site(&build).validate(),
            Err(BuildSpecError::EmptyBaseDirectory)
        );
    }

    #[test]
    fn test_parse_yaml_buildspec() {
        let yaml = r#"
version: "0.2"
phases:
  install:
    runtime-versions:
      nodejs: "14"
    commands:
      - npm ci
  build:
    commands:
      - npm run build
artifacts:
  base-directory: dist
  files:
    - "**/*"
"#;
        let spec = BuildSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.artifacts.unwrap().base_directory, "dist");
        assert_eq!(spec.phases.build.commands, vec!["npm run build"]);
    }
}
