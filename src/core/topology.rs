//! Pipeline topology for the static-site delivery flow.
//!
//! The topology is fixed: Source → Build → Deploy → CacheInvalidation,
//! one action per stage, each at run order 1. Artifact handles are wired
//! statically, so a handle can only ever point at an earlier stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    Action, ActionDecl, ArtifactHandle, BuildAction, CheckoutAction, DeployAction,
    InvalidateAction, SecretRef,
};
use crate::template::LogicalId;

use super::pipeline::{Pipeline, Stage};

/// The four stages of the delivery pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Source,
    Build,
    Deploy,
    CacheInvalidation,
}

impl StageKind {
    /// Stages in execution order
    pub const ALL: [StageKind; 4] = [
        StageKind::Source,
        StageKind::Build,
        StageKind::Deploy,
        StageKind::CacheInvalidation,
    ];

    pub fn stage_name(self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Build => "Build",
            Self::Deploy => "Deploy",
            Self::CacheInvalidation => "CacheInvalidation",
        }
    }

    /// Name of the single action in this stage
    pub fn action_name(self) -> &'static str {
        match self {
            Self::Source => "Checkout",
            Self::Build => "SiteBuild",
            Self::Deploy => "PublishSite",
            Self::CacheInvalidation => "InvalidateCache",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}

/// Where the site's source lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParams {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub credential: SecretRef,
}

/// Assembles the four-stage pipeline
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    name: String,
    source: SourceParams,
    build_project: LogicalId,
    site_bucket: LogicalId,
    invalidation_project: LogicalId,
}

impl TopologyBuilder {
    pub fn new(
        name: impl Into<String>,
        source: SourceParams,
        build_project: LogicalId,
        site_bucket: LogicalId,
        invalidation_project: LogicalId,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            build_project,
            site_bucket,
            invalidation_project,
        }
    }

    pub fn build(&self) -> Pipeline {
        let source_output = ArtifactHandle::source();
        let build_output = ArtifactHandle::build_output();

        let stages = StageKind::ALL.iter().map(|&kind| {
            let action = match kind {
                StageKind::Source => Action::Checkout(CheckoutAction {
                    owner: self.source.owner.clone(),
                    repo: self.source.repo.clone(),
                    branch: self.source.branch.clone(),
                    credential: self.source.credential.clone(),
                    output: source_output.clone(),
                }),
                StageKind::Build => Action::Build(BuildAction {
                    project: self.build_project.clone(),
                    input: source_output.clone(),
                    output: build_output.clone(),
                }),
                StageKind::Deploy => Action::Deploy(DeployAction {
                    bucket: self.site_bucket.clone(),
                    input: build_output.clone(),
                    extract: true,
                }),
                StageKind::CacheInvalidation => Action::Invalidate(InvalidateAction {
                    project: self.invalidation_project.clone(),
                    input: build_output.clone(),
                }),
            };
            Stage::new(kind.stage_name())
                .with_action(ActionDecl::new(kind.action_name(), action).with_run_order(1))
        });

        let pipeline = Pipeline {
            name: self.name.clone(),
            stages: stages.collect(),
        };

        debug!(
            pipeline = %pipeline.name,
            stages = pipeline.stages.len(),
            "Assembled pipeline topology"
        );

        pipeline
    }
}
