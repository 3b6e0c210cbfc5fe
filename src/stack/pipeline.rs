//! The delivery pipeline construct: artifact store, role, pipeline and
//! push webhook.

use serde_json::{json, Value};

use crate::core::topology::StageKind;
use crate::core::Pipeline;
use crate::domain::policy::objects_arn;
use crate::domain::{Action, PolicyDocument, PolicyStatement, SecretRef};
use crate::template::{intrinsic, LogicalId, RemovalPolicy, Resource, Template, TemplateError};

use super::Construct;

#[derive(Debug, Clone)]
pub struct SitePipeline {
    id: LogicalId,
    role_id: LogicalId,
    policy_id: LogicalId,
    artifact_bucket_id: LogicalId,
    webhook_id: LogicalId,
    pipeline: Pipeline,
    /// Project ARNs the pipeline role may start builds on
    projects: Vec<Value>,
    /// Bucket ARNs the pipeline role may write to
    deploy_buckets: Vec<Value>,
}

impl SitePipeline {
    pub fn new(pipeline: Pipeline, projects: Vec<Value>, deploy_buckets: Vec<Value>) -> Self {
        Self {
            id: LogicalId::from_path(&["Pipeline"]),
            role_id: LogicalId::from_path(&["Pipeline", "Role"]),
            policy_id: LogicalId::from_path(&["Pipeline", "Role", "DefaultPolicy"]),
            artifact_bucket_id: Self::artifact_store_id(),
            webhook_id: LogicalId::from_path(&["Pipeline", "Webhook"]),
            pipeline,
            projects,
            deploy_buckets,
        }
    }

    /// Logical id of the artifact store bucket, known before the pipeline exists
    pub fn artifact_store_id() -> LogicalId {
        LogicalId::from_path(&["Pipeline", "ArtifactsBucket"])
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    pub fn artifact_store(&self) -> &LogicalId {
        &self.artifact_bucket_id
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn role_statements(&self) -> Vec<PolicyStatement> {
        let mut buckets = vec![
            intrinsic::get_att(&self.artifact_bucket_id, "Arn"),
            objects_arn(&self.artifact_bucket_id),
        ];
        for bucket in &self.deploy_buckets {
            buckets.push(bucket.clone());
            buckets.push(intrinsic::join("", vec![bucket.clone(), json!("/*")]));
        }

        vec![
            PolicyStatement::allow(
                [
                    "s3:GetObject*",
                    "s3:GetBucket*",
                    "s3:List*",
                    "s3:PutObject",
                    "s3:PutObjectAcl",
                    "s3:DeleteObject*",
                ],
                buckets,
            ),
            PolicyStatement::allow(
                ["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"],
                self.projects.clone(),
            ),
        ]
    }

    /// Checkout action driving the push webhook
    fn checkout(&self) -> Option<(&str, &SecretRef)> {
        let stage = self.pipeline.get_stage(StageKind::Source.stage_name())?;
        stage.actions.iter().find_map(|decl| match &decl.action {
            Action::Checkout(checkout) => Some((decl.name.as_str(), &checkout.credential)),
            _ => None,
        })
    }
}

impl Construct for SitePipeline {
    fn name(&self) -> &str {
        &self.pipeline.name
    }

    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        template.add_resource(
            self.artifact_bucket_id.clone(),
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "BucketEncryption": {
                        "ServerSideEncryptionConfiguration": [{
                            "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                        }],
                    },
                }),
            )
            .with_removal_policy(RemovalPolicy::Retain),
        )?;

        template.add_resource(
            self.role_id.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument":
                        crate::domain::policy::assume_role_policy("codepipeline.amazonaws.com"),
                }),
            ),
        )?;

        template.add_resource(
            self.policy_id.clone(),
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyName": self.policy_id.as_str(),
                    "PolicyDocument": PolicyDocument::new(self.role_statements()).render(),
                    "Roles": [intrinsic::reference(&self.role_id)],
                }),
            ),
        )?;

        template.add_resource(
            self.id.clone(),
            Resource::new(
                "AWS::CodePipeline::Pipeline",
                json!({
                    "Name": self.pipeline.name,
                    "RoleArn": intrinsic::get_att(&self.role_id, "Arn"),
                    "ArtifactStore": {
                        "Type": "S3",
                        "Location": intrinsic::reference(&self.artifact_bucket_id),
                    },
                    "RestartExecutionOnUpdate": false,
                    "Stages": self.pipeline.render_stages(),
                }),
            )
            .depends_on(&self.policy_id)
            .depends_on(&self.role_id),
        )?;

        // New commits on the branch start a new execution
        if let Some((action_name, credential)) = self.checkout() {
            template.add_resource(
                self.webhook_id.clone(),
                Resource::new(
                    "AWS::CodePipeline::Webhook",
                    json!({
                        "Authentication": "GITHUB_HMAC",
                        "AuthenticationConfiguration": {
                            "SecretToken": credential.dynamic_reference(),
                        },
                        "Filters": [{
                            "JsonPath": "$.ref",
                            "MatchEquals": "refs/heads/{Branch}",
                        }],
                        "TargetAction": action_name,
                        "TargetPipeline": intrinsic::reference(&self.id),
                        "TargetPipelineVersion": 1,
                        "RegisterWithThirdParty": true,
                    }),
                ),
            )?;
        }

        Ok(())
    }
}
