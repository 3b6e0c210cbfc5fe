//! Pipeline actions.
//!
//! The action taxonomy is closed: checkout, build, deploy and invalidate.
//! Each variant owns its artifact wiring and knows how it is rendered into
//! the pipeline declaration.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::template::{intrinsic, LogicalId};

use super::artifact::ArtifactHandle;

/// The kind of remote work an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    SourceCheckout,
    Build,
    Deploy,
    CustomBuild,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceCheckout => "source-checkout",
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::CustomBuild => "custom-build",
        };
        f.write_str(name)
    }
}

/// Reference to a credential held in the secret store.
///
/// Only the reference is ever written out; the value is resolved by the
/// provider at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret name in the secret store
    pub name: String,

    /// JSON field inside the secret, when the secret is a JSON document
    #[serde(default)]
    pub json_field: Option<String>,
}

impl SecretRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json_field: None,
        }
    }

    pub fn with_json_field(mut self, field: impl Into<String>) -> Self {
        self.json_field = Some(field.into());
        self
    }

    /// Dynamic reference resolved at deploy time
    pub fn dynamic_reference(&self) -> String {
        match &self.json_field {
            Some(field) => format!(
                "{{{{resolve:secretsmanager:{}:SecretString:{}}}}}",
                self.name, field
            ),
            None => format!("{{{{resolve:secretsmanager:{}:SecretString}}}}", self.name),
        }
    }
}

/// Checkout of one branch of a source-control repository
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutAction {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub credential: SecretRef,
    pub output: ArtifactHandle,
}

/// Site build in a containerized build project
#[derive(Debug, Clone, PartialEq)]
pub struct BuildAction {
    pub project: LogicalId,
    pub input: ArtifactHandle,
    pub output: ArtifactHandle,
}

/// Upload of an artifact's files into a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct DeployAction {
    pub bucket: LogicalId,
    pub input: ArtifactHandle,
    /// Unpack the bundle into individual objects instead of one archive
    pub extract: bool,
}

/// Cache invalidation job; the input only signals completion
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidateAction {
    pub project: LogicalId,
    pub input: ArtifactHandle,
}

/// A unit of remote work
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Checkout(CheckoutAction),
    Build(BuildAction),
    Deploy(DeployAction),
    Invalidate(InvalidateAction),
}

/// Provider-side action type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTypeId {
    pub category: &'static str,
    pub owner: &'static str,
    pub provider: &'static str,
    pub version: &'static str,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Checkout(_) => ActionKind::SourceCheckout,
            Self::Build(_) => ActionKind::Build,
            Self::Deploy(_) => ActionKind::Deploy,
            Self::Invalidate(_) => ActionKind::CustomBuild,
        }
    }

    /// Artifacts this action reads
    pub fn inputs(&self) -> Vec<&ArtifactHandle> {
        match self {
            Self::Checkout(_) => Vec::new(),
            Self::Build(a) => vec![&a.input],
            Self::Deploy(a) => vec![&a.input],
            Self::Invalidate(a) => vec![&a.input],
        }
    }

    /// Artifacts this action produces
    pub fn outputs(&self) -> Vec<&ArtifactHandle> {
        match self {
            Self::Checkout(a) => vec![&a.output],
            Self::Build(a) => vec![&a.output],
            Self::Deploy(_) | Self::Invalidate(_) => Vec::new(),
        }
    }

    pub fn type_id(&self) -> ActionTypeId {
        match self {
            Self::Checkout(_) => ActionTypeId {
                category: "Source",
                owner: "ThirdParty",
                provider: "GitHub",
                version: "1",
            },
            Self::Build(_) | Self::Invalidate(_) => ActionTypeId {
                category: "Build",
                owner: "AWS",
                provider: "CodeBuild",
                version: "1",
            },
            Self::Deploy(_) => ActionTypeId {
                category: "Deploy",
                owner: "AWS",
                provider: "S3",
                version: "1",
            },
        }
    }

    /// Provider configuration block
    pub fn configuration(&self) -> Value {
        match self {
            Self::Checkout(a) => json!({
                "Owner": a.owner,
                "Repo": a.repo,
                "Branch": a.branch,
                "OAuthToken": a.credential.dynamic_reference(),
                "PollForSourceChanges": false,
            }),
            Self::Build(a) => json!({ "ProjectName": intrinsic::reference(&a.project) }),
            Self::Deploy(a) => json!({
                "BucketName": intrinsic::reference(&a.bucket),
                "Extract": a.extract.to_string(),
            }),
            Self::Invalidate(a) => json!({ "ProjectName": intrinsic::reference(&a.project) }),
        }
    }
}

/// An action bound to a name and a run order within its stage
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecl {
    pub name: String,
    /// Actions sharing a run order within a stage may run concurrently
    pub run_order: u32,
    pub action: Action,
}

impl ActionDecl {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            run_order: 1,
            action,
        }
    }

    pub fn with_run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }

    pub fn render(&self) -> Value {
        let type_id = self.action.type_id();
        let mut rendered = json!({
            "Name": self.name,
            "ActionTypeId": {
                "Category": type_id.category,
                "Owner": type_id.owner,
                "Provider": type_id.provider,
                "Version": type_id.version,
            },
            "Configuration": self.action.configuration(),
            "RunOrder": self.run_order,
        });

        let inputs: Vec<Value> = self.action.inputs().iter().map(|a| a.render()).collect();
        if !inputs.is_empty() {
            rendered["InputArtifacts"] = Value::Array(inputs);
        }
        let outputs: Vec<Value> = self.action.outputs().iter().map(|a| a.render()).collect();
        if !outputs.is_empty() {
            rendered["OutputArtifacts"] = Value::Array(outputs);
        }

        rendered
    }
}
