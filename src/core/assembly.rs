//! Cloud assembly output directory.
//!
//! Layout:
//!
//! ```text
//! <out>/
//!   .lock                      single-flight lock (holder pid + command)
//!   manifest.json              stack -> template file, hash, outputs
//!   <Stack>.template.json      rendered template
//!   history.jsonl              synthesis log (see `history`)
//! ```
//!
//! Only one synthesis may write an output directory at a time. A second
//! one fails fast instead of interleaving writes to the same templates.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::template::Template;

pub const LOCK_FILE: &str = ".lock";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Output directory {path} is locked by another synthesis ({holder})")]
    Locked { path: PathBuf, holder: String },

    #[error("Failed to lock output directory {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Index of the templates in an output directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, StackArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackArtifact {
    pub template_file: String,
    pub template_hash: String,
    pub resource_count: usize,
    pub outputs: Vec<String>,
}

/// Result of writing one stack
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub artifact: StackArtifact,
    /// Hash the manifest held for this stack before the write
    pub previous_hash: Option<String>,
}

impl Written {
    pub fn changed(&self) -> bool {
        self.previous_hash.as_deref() != Some(self.artifact.template_hash.as_str())
    }
}

/// Exclusive lock on an output directory, released on drop
pub struct AssemblyLock {
    file: File,
    path: PathBuf,
}

impl AssemblyLock {
    pub fn acquire(out_dir: &Path, command: &str) -> Result<Self, AssemblyError> {
        let path = out_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| AssemblyError::LockFailed {
                path: path.clone(),
                source,
            })?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                let holder = std::fs::read_to_string(&path)
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "unknown holder".to_string());
                return Err(AssemblyError::Locked {
                    path,
                    holder: holder.trim().to_string(),
                });
            }
            return Err(AssemblyError::LockFailed { path, source: err });
        }

        let holder = format!("pid {} running '{}'", std::process::id(), command);
        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(holder.as_bytes()))
            .and_then(|_| file.flush());
        if let Err(err) = written {
            warn!(error = %err, "Could not record lock holder");
        }

        debug!(path = %path.display(), "Acquired output directory lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AssemblyLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
    }
}

/// Writer/reader for one output directory
#[derive(Debug, Clone)]
pub struct Assembly {
    out_dir: PathBuf,
}

impl Assembly {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn template_file_name(stack_name: &str) -> String {
        format!("{}.template.json", stack_name)
    }

    pub fn template_path(&self, stack_name: &str) -> PathBuf {
        self.out_dir.join(Self::template_file_name(stack_name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    /// Write a stack template and update the manifest under the lock
    pub fn write(&self, stack_name: &str, template: &Template) -> Result<Written> {
        std::fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.out_dir.display())
        })?;

        let _lock = AssemblyLock::acquire(&self.out_dir, &format!("synth {}", stack_name))?;

        let rendered = template.to_json()?;
        write_atomic(&self.template_path(stack_name), rendered.as_bytes())?;

        let artifact = StackArtifact {
            template_file: Self::template_file_name(stack_name),
            template_hash: template.hash()?,
            resource_count: template.resources.len(),
            outputs: template.outputs.keys().cloned().collect(),
        };

        let mut manifest = self.read_manifest()?.unwrap_or_else(|| Manifest {
            version: MANIFEST_VERSION.to_string(),
            artifacts: BTreeMap::new(),
        });
        let previous_hash = manifest
            .artifacts
            .insert(stack_name.to_string(), artifact.clone())
            .map(|previous| previous.template_hash);

        let mut manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        manifest_json.push('\n');
        write_atomic(&self.manifest_path(), manifest_json.as_bytes())?;

        debug!(stack = stack_name, hash = %artifact.template_hash, "Wrote template");
        Ok(Written {
            artifact,
            previous_hash,
        })
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn read_template(&self, stack_name: &str) -> Result<Template> {
        let path = self.template_path(stack_name);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        Template::from_json(&content)
    }
}

/// Replace `path` with `contents` without exposing a partial file
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{LogicalId, Resource};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_template() -> Template {
        let mut template = Template::new();
        template
            .add_resource(
                LogicalId::from_path(&["SiteBucket"]),
                Resource::new("AWS::S3::Bucket", json!({})),
            )
            .unwrap();
        template
    }

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let assembly = Assembly::new(temp.path().join("out"));
        let template = sample_template();

        let written = assembly.write("SiteStack", &template).unwrap();
        assert!(written.changed());
        let artifact = written.artifact;
        assert_eq!(artifact.template_file, "SiteStack.template.json");
        assert_eq!(artifact.resource_count, 1);

        assert_eq!(assembly.read_template("SiteStack").unwrap(), template);
        let manifest = assembly.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.artifacts["SiteStack"], artifact);
    }

    #[test]
    fn test_changed_compares_against_manifest() {
        let temp = TempDir::new().unwrap();
        let assembly = Assembly::new(temp.path());

        let first = assembly.write("SiteStack", &Template::new()).unwrap();
        assert_eq!(first.previous_hash, None);

        let same = assembly.write("SiteStack", &Template::new()).unwrap();
        assert_eq!(same.previous_hash, Some(first.artifact.template_hash.clone()));
        assert!(!same.changed());

        let other = assembly.write("SiteStack", &sample_template()).unwrap();
        assert!(other.changed());
        assert_eq!(other.previous_hash, Some(first.artifact.template_hash));
    }

    #[test]
    fn test_manifest_keeps_other_stacks() {
        let temp = TempDir::new().unwrap();
        let assembly = Assembly::new(temp.path());

        assembly.write("First", &Template::new()).unwrap();
        assembly.write("Second", &sample_template()).unwrap();

        let manifest = assembly.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.artifacts.len(), 2);
        assert_eq!(manifest.artifacts["First"].resource_count, 0);
    }

    #[test]
    fn test_concurrent_synthesis_is_rejected() {
        let temp = TempDir::new().unwrap();
        let held = AssemblyLock::acquire(temp.path(), "synth Held").unwrap();

        let second = AssemblyLock::acquire(temp.path(), "synth Other");
        match second {
            Err(AssemblyError::Locked { holder, .. }) => assert!(holder.contains("synth Held")),
            Err(other) => panic!("Expected Locked, got {other}"),
            Ok(_) => panic!("Expected Locked, got a second lock"),
        }

        let assembly = Assembly::new(temp.path());
        assert!(assembly.write("SiteStack", &sample_template()).is_err());

        drop(held);
        assert!(assembly.write("SiteStack", &sample_template()).is_ok());
    }
}
