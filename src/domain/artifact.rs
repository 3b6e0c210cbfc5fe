//! Artifact handles passed between pipeline actions.
//!
//! An artifact is an opaque, immutable bundle of files. The stack only
//! ever deals in handles: the orchestration service creates the bundle
//! when the producing action starts, and discards it when the execution
//! ends.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Handle of the checked-out source snapshot
pub const SOURCE_OUTPUT: &str = "SourceOutput";

/// Handle of the generated site file tree
pub const BUILD_OUTPUT: &str = "BuildOutput";

/// A named artifact handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Handle of the source checkout bundle
    pub fn source() -> Self {
        Self::new(SOURCE_OUTPUT)
    }

    /// Handle of the site build output bundle
    pub fn build_output() -> Self {
        Self::new(BUILD_OUTPUT)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Template shape: `{"Name": <handle>}`
    pub fn render(&self) -> Value {
        json!({ "Name": self.0 })
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_handles() {
        assert_eq!(ArtifactHandle::source().name(), "SourceOutput");
        assert_eq!(ArtifactHandle::build_output().name(), "BuildOutput");
        assert_ne!(ArtifactHandle::source(), ArtifactHandle::build_output());
    }

    #[test]
    fn test_artifact_render() {
        let handle = ArtifactHandle::build_output();
        assert_eq!(handle.render(), json!({ "Name": "BuildOutput" }));
        assert_eq!(handle.to_string(), "BuildOutput");
    }
}
