//! Deployment template model.
//!
//! A template is a flat map of logical ids to resource declarations plus
//! a map of named outputs. Both maps are ordered, so rendering the same
//! stack twice produces byte-identical JSON.

pub mod intrinsic;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Stable identifier of a resource within a template.
///
/// Derived from the construct path: the alphanumeric characters of each
/// path component, followed by the first 8 hex chars of the SHA-256 of the
/// full path. The suffix keeps ids unique when two paths collapse to the
/// same human-readable prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Build a logical id from construct path components
    pub fn from_path(path: &[&str]) -> Self {
        let readable: String = path
            .iter()
            .flat_map(|component| component.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(path.join("/").as_bytes());
        let digest = hasher.finalize();

        Self(format!("{}{}", readable, hex::encode_upper(&digest[..4])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happens to a resource when it leaves the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

/// A single resource declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties", default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,

    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,

    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    /// Apply the same policy on replacement and on stack removal
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        if !self.depends_on.contains(id) {
            self.depends_on.push(id.clone());
            self.depends_on.sort();
        }
        self
    }

    /// Look up a top-level property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A named stack output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: Value,
}

/// Errors raised while assembling a template
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Duplicate logical id: {0}")]
    DuplicateResource(LogicalId),

    #[error("Duplicate output: {0}")]
    DuplicateOutput(String),

    #[error("Resource '{from}' references unknown resource '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("Resource '{id}' has a property that cannot be rendered: {reason}")]
    InvalidProperty { id: LogicalId, reason: String },
}

/// A complete template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "Resources", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<LogicalId, Resource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<(), TemplateError> {
        if self.resources.contains_key(&id) {
            return Err(TemplateError::DuplicateResource(id));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<(), TemplateError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(TemplateError::DuplicateOutput(name));
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// All resources of the given type, in logical id order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Check that every Ref / GetAtt / DependsOn target exists
    pub fn check_references(&self) -> Result<(), TemplateError> {
        let known = |id: &str| self.resources.keys().any(|k| k.as_str() == id);

        for (id, resource) in &self.resources {
            let targets = intrinsic::referenced_ids(&resource.properties)
                .into_iter()
                .chain(resource.depends_on.iter().map(|d| d.as_str().to_string()));
            for target in targets {
                if !known(&target) {
                    return Err(TemplateError::DanglingReference {
                        from: id.to_string(),
                        to: target,
                    });
                }
            }
        }

        for (name, output) in &self.outputs {
            for target in intrinsic::referenced_ids(&output.value) {
                if !known(&target) {
                    return Err(TemplateError::DanglingReference {
                        from: name.clone(),
                        to: target,
                    });
                }
            }
        }

        Ok(())
    }

    /// Render as pretty JSON with sorted keys and a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut rendered =
            serde_json::to_string_pretty(self).context("Failed to serialize template")?;
        rendered.push('\n');
        Ok(rendered)
    }

    /// SHA-256 (hex) of the rendered template
    pub fn hash(&self) -> Result<String> {
        let rendered = self.to_json()?;
        let mut hasher = Sha256::new();
        hasher.update(rendered.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Parse a previously rendered template
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse template JSON")
    }
}
