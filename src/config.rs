//! Configuration for sitestack.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SITESTACK_BRANCH, SITESTACK_OUT_DIR)
//! 2. Config file (explicit `--config`, else `sitestack.yaml` in the current
//!    directory or a parent, else `~/.config/sitestack/sitestack.yaml`)
//! 3. Defaults
//!
//! Relative `out_dir` paths are resolved against the config file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::SourceParams;
use crate::domain::{SecretRef, SiteBuild};
use crate::stack::{SiteStackProps, WebsiteSettings};

pub const CONFIG_FILE_NAME: &str = "sitestack.yaml";
pub const CONFIG_VERSION: &str = "1";
pub const ENV_BRANCH: &str = "SITESTACK_BRANCH";
pub const ENV_OUT_DIR: &str = "SITESTACK_OUT_DIR";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default = "default_stack_name")]
    pub stack_name: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub build: SiteBuild,
    #[serde(default)]
    pub website: WebsiteSettings,
    #[serde(default)]
    pub build_image: Option<String>,
    #[serde(default)]
    pub out_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Secret holding the source provider token
    pub secret_name: String,
    /// JSON field inside the secret, if the secret is a JSON document
    #[serde(default)]
    pub secret_json_field: Option<String>,
}

fn default_stack_name() -> String {
    "SiteStack".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_out_dir() -> &'static str {
    "cdk.out"
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Stack properties
    pub props: SiteStackProps,
    /// Absolute or cwd-relative output directory
    pub out_dir: PathBuf,
    /// Path to config file
    pub config_file: PathBuf,
}

impl ConfigFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            anyhow::bail!(
                "Unsupported config version '{}' (expected '{}')",
                self.version,
                CONFIG_VERSION
            );
        }
        if self.stack_name.trim().is_empty() {
            anyhow::bail!("stack_name cannot be empty");
        }
        if !self.stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "stack_name '{}' may only contain letters, digits and '-'",
                self.stack_name
            );
        }
        for (field, value) in [
            ("source.owner", &self.source.owner),
            ("source.repo", &self.source.repo),
            ("source.branch", &self.source.branch),
            ("source.secret_name", &self.source.secret_name),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", field);
            }
        }
        Ok(())
    }

    fn into_props(self) -> SiteStackProps {
        let mut credential = SecretRef::new(self.source.secret_name);
        if let Some(field) = self.source.secret_json_field {
            credential = credential.with_json_field(field);
        }

        SiteStackProps {
            stack_name: self.stack_name,
            source: SourceParams {
                owner: self.source.owner,
                repo: self.source.repo,
                branch: self.source.branch,
                credential,
            },
            build: self.build,
            website: self.website,
            build_image: self.build_image,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    // User-level fallback
    let user_config = dirs::config_dir()?.join("sitestack").join(CONFIG_FILE_NAME);
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    ConfigFile::from_yaml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file().with_context(|| {
            format!(
                "No {} found in the current directory or its parents",
                CONFIG_FILE_NAME
            )
        })?,
    };

    let mut file = load_config_file(&config_file)?;

    if let Ok(branch) = std::env::var(ENV_BRANCH) {
        file.source.branch = branch;
    }
    file.validate()
        .with_context(|| format!("Invalid config file: {}", config_file.display()))?;

    let base_dir = config_file.parent().unwrap_or(Path::new("."));
    let out_dir = match std::env::var(ENV_OUT_DIR) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => resolve_path(
            base_dir,
            file.out_dir.as_deref().unwrap_or(default_out_dir()),
        ),
    };

    Ok(ResolvedConfig {
        props: file.into_props(),
        out_dir,
        config_file,
    })
}
