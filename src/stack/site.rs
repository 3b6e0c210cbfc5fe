//! The complete static-site stack.
//!
//! Wires the bucket, the distribution in front of it, the site build
//! project, the invalidation job and the four-stage pipeline into one
//! stack, and checks the cross-resource invariants before synthesis.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::pipeline::WiringError;
use crate::core::topology::{SourceParams, StageKind, TopologyBuilder};
use crate::core::Pipeline;
use crate::domain::policy::{ARTIFACT_READ_ACTIONS, ARTIFACT_WRITE_ACTIONS, INVALIDATION_ACTIONS};
use crate::domain::{Action, BuildSpec, PolicyStatement, SiteBuild};
use crate::template::{intrinsic, LogicalId, Output, Template};

use super::{BuildProject, SiteBucket, SiteDistribution, SitePipeline, Stack, WebsiteSettings};

/// Environment variable carrying the distribution id into the invalidation job
pub const DISTRIBUTION_ID_ENV: &str = "CLOUDFRONT_ID";

/// Output name of the bucket website URL
pub const WEBSITE_URL_OUTPUT: &str = "WebsiteURL";

/// Output name of the distribution domain name
pub const DISTRIBUTION_DOMAIN_OUTPUT: &str = "DistributionDomainName";

/// Everything needed to instantiate the stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStackProps {
    pub stack_name: String,
    pub source: SourceParams,
    #[serde(default)]
    pub build: SiteBuild,
    #[serde(default)]
    pub website: WebsiteSettings,
    /// Build image override for both projects
    #[serde(default)]
    pub build_image: Option<String>,
}

/// Cross-resource invariant violations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Invalid pipeline wiring: {0}")]
    Wiring(#[from] WiringError),

    #[error("Stage order must be {expected:?}, found {actual:?}")]
    StageOrder {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Stage '{0}' does not contain the expected action")]
    MissingAction(String),

    #[error("Deploy target '{deploy}' is not the distribution origin '{origin}'")]
    DeployTargetMismatch { deploy: String, origin: String },

    #[error("Invalidation job variable {var} does not reference distribution '{expected}'")]
    DistributionIdMismatch { var: String, expected: String },

    #[error("Invalidation policy grants access to every resource")]
    WildcardInvalidationPolicy,

    #[error("Invalidation policy is missing '{0}' on the distribution")]
    MissingInvalidationPermission(String),

    #[error("Project '{project}' is missing '{action}' on the artifact store")]
    MissingArtifactAccess { project: String, action: String },
}

#[derive(Debug, Clone)]
pub struct SiteStack {
    name: String,
    bucket: SiteBucket,
    distribution: SiteDistribution,
    build_project: BuildProject,
    invalidation_project: BuildProject,
    pipeline: SitePipeline,
}

impl SiteStack {
    /// Instantiate the stack; fails if either build spec is invalid
    #[instrument(skip(props), fields(stack = %props.stack_name))]
    pub fn new(props: &SiteStackProps) -> Result<Self> {
        let bucket = SiteBucket::new(props.website.clone());
        let distribution = SiteDistribution::new(&bucket);

        let artifact_store = SitePipeline::artifact_store_id();

        let site_spec = BuildSpec::site(&props.build);
        site_spec.validate().context("Invalid site build spec")?;
        let mut build_project = BuildProject::new("SiteBuildProject", site_spec)
            .with_statement(PolicyStatement::artifact_read_write(&artifact_store));

        let invalidation_spec = BuildSpec::invalidation(DISTRIBUTION_ID_ENV);
        invalidation_spec
            .validate()
            .context("Invalid invalidation build spec")?;
        let mut invalidation_project =
            BuildProject::new("InvalidationProject", invalidation_spec)
                .with_env(DISTRIBUTION_ID_ENV, distribution.distribution_id())
                .with_statement(PolicyStatement::artifact_read(&artifact_store))
                .with_statement(PolicyStatement::invalidation(distribution.id()));

        if let Some(image) = &props.build_image {
            build_project = build_project.with_image(image.clone());
            invalidation_project = invalidation_project.with_image(image.clone());
        }

        let topology = TopologyBuilder::new(
            format!("{}Pipeline", props.stack_name),
            props.source.clone(),
            build_project.id().clone(),
            bucket.id().clone(),
            invalidation_project.id().clone(),
        )
        .build();

        let pipeline = SitePipeline::new(
            topology,
            vec![build_project.arn(), invalidation_project.arn()],
            vec![bucket.arn()],
        );

        debug!("Stack constructs assembled");

        Ok(Self {
            name: props.stack_name.clone(),
            bucket,
            distribution,
            build_project,
            invalidation_project,
            pipeline,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket(&self) -> &SiteBucket {
        &self.bucket
    }

    pub fn distribution(&self) -> &SiteDistribution {
        &self.distribution
    }

    pub fn build_project(&self) -> &BuildProject {
        &self.build_project
    }

    pub fn invalidation_project(&self) -> &BuildProject {
        &self.invalidation_project
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline.pipeline()
    }

    /// Bucket the pipeline passes artifacts through
    pub fn artifact_store(&self) -> &LogicalId {
        self.pipeline.artifact_store()
    }

    /// Named outputs published after stack creation
    pub fn outputs(&self) -> Vec<(&'static str, Output)> {
        vec![
            (
                WEBSITE_URL_OUTPUT,
                Output {
                    description: Some("Website URL of the site bucket".to_string()),
                    value: self.bucket.website_url(),
                },
            ),
            (
                DISTRIBUTION_DOMAIN_OUTPUT,
                Output {
                    description: Some("Domain name of the distribution".to_string()),
                    value: self.distribution.domain_name(),
                },
            ),
        ]
    }

    /// Check the invariants that tie the resources together
    pub fn verify(&self) -> Result<(), ConsistencyError> {
        let pipeline = self.pipeline();
        pipeline.validate()?;

        let expected: Vec<String> = StageKind::ALL
            .iter()
            .map(|k| k.stage_name().to_string())
            .collect();
        let actual: Vec<String> = pipeline.stages.iter().map(|s| s.name.clone()).collect();
        if expected != actual {
            return Err(ConsistencyError::StageOrder { expected, actual });
        }

        // Deploy must publish into the bucket the distribution serves
        let deploy_bucket = pipeline.stages[2]
            .actions
            .iter()
            .find_map(|decl| match &decl.action {
                Action::Deploy(deploy) => Some(&deploy.bucket),
                _ => None,
            })
            .ok_or_else(|| ConsistencyError::MissingAction(StageKind::Deploy.to_string()))?;
        if deploy_bucket != self.distribution.origin_bucket() {
            return Err(ConsistencyError::DeployTargetMismatch {
                deploy: deploy_bucket.to_string(),
                origin: self.distribution.origin_bucket().to_string(),
            });
        }

        let invalidation_project = pipeline.stages[3]
            .actions
            .iter()
            .find_map(|decl| match &decl.action {
                Action::Invalidate(invalidate) => Some(&invalidate.project),
                _ => None,
            })
            .ok_or_else(|| {
                ConsistencyError::MissingAction(StageKind::CacheInvalidation.to_string())
            })?;
        if invalidation_project != self.invalidation_project.id() {
            return Err(ConsistencyError::MissingAction(
                StageKind::CacheInvalidation.to_string(),
            ));
        }

        let distribution_id = self.distribution.id().as_str();
        let env_target = self
            .invalidation_project
            .env(DISTRIBUTION_ID_ENV)
            .and_then(intrinsic::ref_target);
        if env_target != Some(distribution_id) {
            return Err(ConsistencyError::DistributionIdMismatch {
                var: DISTRIBUTION_ID_ENV.to_string(),
                expected: distribution_id.to_string(),
            });
        }

        let statements = self.invalidation_project.statements();
        if statements.iter().any(PolicyStatement::is_wildcard) {
            return Err(ConsistencyError::WildcardInvalidationPolicy);
        }
        for action in INVALIDATION_ACTIONS {
            let granted = statements.iter().any(|s| {
                s.allows(action) && s.resources.iter().any(|r| targets(r, distribution_id))
            });
            if !granted {
                return Err(ConsistencyError::MissingInvalidationPermission(
                    action.to_string(),
                ));
            }
        }

        // Both jobs fetch their input from the artifact store; the site build
        // also uploads its output there
        self.check_artifact_access(&self.build_project, true)?;
        self.check_artifact_access(&self.invalidation_project, false)?;

        Ok(())
    }

    fn check_artifact_access(
        &self,
        project: &BuildProject,
        uploads: bool,
    ) -> Result<(), ConsistencyError> {
        let store = self.pipeline.artifact_store().as_str();
        let writes: &[&str] = if uploads { &ARTIFACT_WRITE_ACTIONS } else { &[] };

        for action in ARTIFACT_READ_ACTIONS.iter().chain(writes) {
            let granted = project.statements().iter().any(|s| {
                s.allows(action)
                    && s.resources.iter().any(|r| targets(r, store))
                    && s.resources.iter().any(|r| covers_objects(r, store))
            });
            if !granted {
                return Err(ConsistencyError::MissingArtifactAccess {
                    project: project.id().to_string(),
                    action: action.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Stack view of this site, ready to synthesize
    pub fn to_stack(&self) -> Stack {
        let mut stack = Stack::new(self.name.clone());
        stack
            .add(self.bucket.clone())
            .add(self.distribution.clone())
            .add(self.build_project.clone())
            .add(self.invalidation_project.clone())
            .add(self.pipeline.clone());
        for (name, output) in self.outputs() {
            stack.add_output(name, output);
        }
        stack
    }

    /// Verify, then render the template
    pub fn synth(&self) -> Result<Template> {
        self.verify()
            .with_context(|| format!("Stack '{}' failed verification", self.name))?;
        let template = self.to_stack().synth()?;
        info!(
            stack = %self.name,
            resources = template.resources.len(),
            "Synthesized stack"
        );
        Ok(template)
    }
}

fn targets(resource: &Value, id: &str) -> bool {
    intrinsic::referenced_ids(resource).iter().any(|r| r == id)
}

fn covers_objects(resource: &Value, bucket: &str) -> bool {
    resource["Fn::Join"][1]
        .as_array()
        .map_or(false, |parts| {
            parts.last().and_then(Value::as_str) == Some("/*")
                && parts.iter().any(|p| intrinsic::get_att_target(p) == Some(bucket))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SecretRef;

    fn props() -> SiteStackProps {
        SiteStackProps {
            stack_name: "SiteStack".to_string(),
            source: SourceParams {
                owner: "X".to_string(),
                repo: "Y".to_string(),
                branch: "master".to_string(),
                credential: SecretRef::new("github-token"),
            },
            build: SiteBuild::default(),
            website: WebsiteSettings::default(),
            build_image: None,
        }
    }

    #[test]
    fn test_default_stack_verifies() {
        let stack = SiteStack::new(&props()).unwrap();
        assert!(stack.verify().is_ok());
        assert_eq!(stack.pipeline().name, "SiteStackPipeline");
    }

    #[test]
    fn test_invalid_build_rejected() {
        let mut props = props();
        props.build.build_commands.clear();
        assert!(SiteStack::new(&props).is_err());
    }

    #[test]
    fn test_wildcard_policy_rejected() {
        let mut stack = SiteStack::new(&props()).unwrap();
        stack.invalidation_project = stack.invalidation_project.clone().with_statement(
            PolicyStatement::allow(["cloudfront:CreateInvalidation"], vec![serde_json::json!("*")]),
        );
        assert_eq!(
            stack.verify(),
            Err(ConsistencyError::WildcardInvalidationPolicy)
        );
    }

    #[test]
    fn test_distribution_env_mismatch_detected() {
        let mut stack = SiteStack::new(&props()).unwrap();
        let distribution = stack.distribution.id().clone();
        stack.invalidation_project = BuildProject::new(
            "InvalidationProject",
            BuildSpec::invalidation(DISTRIBUTION_ID_ENV),
        )
        .with_env(DISTRIBUTION_ID_ENV, serde_json::json!("E123EXAMPLE"))
        .with_statement(PolicyStatement::invalidation(&distribution));

        assert!(matches!(
            stack.verify(),
            Err(ConsistencyError::DistributionIdMismatch { .. })
        ));
    }

    #[test]
    fn test_build_without_artifact_upload_rejected() {
        let mut stack = SiteStack::new(&props()).unwrap();
        let store = stack.pipeline.artifact_store().clone();
        stack.build_project = BuildProject::new(
            "SiteBuildProject",
            BuildSpec::site(&SiteBuild::default()),
        )
        .with_statement(PolicyStatement::artifact_read(&store));

        assert_eq!(
            stack.verify(),
            Err(ConsistencyError::MissingArtifactAccess {
                project: stack.build_project.id().to_string(),
                action: "s3:PutObject".to_string(),
            })
        );
    }

    #[test]
    fn test_invalidation_without_artifact_read_rejected() {
        let mut stack = SiteStack::new(&props()).unwrap();
        let distribution = stack.distribution.id().clone();
        stack.invalidation_project = BuildProject::new(
            "InvalidationProject",
            BuildSpec::invalidation(DISTRIBUTION_ID_ENV),
        )
        .with_env(DISTRIBUTION_ID_ENV, stack.distribution.distribution_id())
        .with_statement(PolicyStatement::invalidation(&distribution));

        assert!(matches!(
            stack.verify(),
            Err(ConsistencyError::MissingArtifactAccess { action, .. }) if action == "s3:GetObject*"
        ));
    }

    #[test]
    fn test_custom_image_applies_to_both_projects() {
        let mut props = props();
        props.build_image = Some("aws/codebuild/standard:6.0".to_string());
        let template = SiteStack::new(&props).unwrap().synth().unwrap();

        let images: Vec<&Value> = template
            .resources_of_type("AWS::CodeBuild::Project")
            .map(|(_, r)| &r.properties["Environment"]["Image"])
            .collect();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|i| *i == "aws/codebuild/standard:6.0"));
    }
}
