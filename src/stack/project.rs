//! Containerized build projects and their execution roles.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::domain::{BuildSpec, PolicyDocument, PolicyStatement};
use crate::template::{intrinsic, LogicalId, Resource, Template, TemplateError};

use super::Construct;

/// Default build image
pub const STANDARD_IMAGE: &str = "aws/codebuild/standard:5.0";

/// Default compute size
pub const SMALL_COMPUTE: &str = "BUILD_GENERAL1_SMALL";

/// A build project bound to a pipeline action
#[derive(Debug, Clone)]
pub struct BuildProject {
    name: String,
    id: LogicalId,
    role_id: LogicalId,
    policy_id: LogicalId,
    buildspec: BuildSpec,
    image: String,
    compute_type: String,
    environment: BTreeMap<String, Value>,
    statements: Vec<PolicyStatement>,
}

impl BuildProject {
    pub fn new(name: impl Into<String>, buildspec: BuildSpec) -> Self {
        let name = name.into();
        Self {
            id: LogicalId::from_path(&[name.as_str()]),
            role_id: LogicalId::from_path(&[name.as_str(), "Role"]),
            policy_id: LogicalId::from_path(&[name.as_str(), "Role", "DefaultPolicy"]),
            name,
            buildspec,
            image: STANDARD_IMAGE.to_string(),
            compute_type: SMALL_COMPUTE.to_string(),
            environment: BTreeMap::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Plaintext environment variable; the value may be an intrinsic
    pub fn with_env(mut self, name: impl Into<String>, value: Value) -> Self {
        self.environment.insert(name.into(), value);
        self
    }

    /// Extra permission for the project's execution role
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    pub fn buildspec(&self) -> &BuildSpec {
        &self.buildspec
    }

    pub fn env(&self, name: &str) -> Option<&Value> {
        self.environment.get(name)
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }

    fn logs_statement() -> PolicyStatement {
        PolicyStatement::allow(
            [
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ],
            vec![intrinsic::sub(
                "arn:${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/codebuild/*",
            )],
        )
    }
}

impl Construct for BuildProject {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        template.add_resource(
            self.role_id.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument":
                        crate::domain::policy::assume_role_policy("codebuild.amazonaws.com"),
                }),
            ),
        )?;

        let mut statements = vec![Self::logs_statement()];
        statements.extend(self.statements.iter().cloned());
        template.add_resource(
            self.policy_id.clone(),
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyName": self.policy_id.as_str(),
                    "PolicyDocument": PolicyDocument::new(statements).render(),
                    "Roles": [intrinsic::reference(&self.role_id)],
                }),
            ),
        )?;

        let buildspec = self.buildspec.to_json_string().map_err(|e| {
            TemplateError::InvalidProperty {
                id: self.id.clone(),
                reason: format!("{:#}", e),
            }
        })?;
        let environment_variables: Vec<Value> = self
            .environment
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Type": "PLAINTEXT", "Value": value }))
            .collect();

        template.add_resource(
            self.id.clone(),
            Resource::new(
                "AWS::CodeBuild::Project",
                json!({
                    "Source": {
                        "Type": "CODEPIPELINE",
                        "BuildSpec": buildspec,
                    },
                    "Artifacts": { "Type": "CODEPIPELINE" },
                    "Environment": {
                        "Type": "LINUX_CONTAINER",
                        "Image": self.image,
                        "ComputeType": self.compute_type,
                        "PrivilegedMode": false,
                        "EnvironmentVariables": environment_variables,
                    },
                    "ServiceRole": intrinsic::get_att(&self.role_id, "Arn"),
                }),
            )
            .depends_on(&self.policy_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SiteBuild;

    #[test]
    fn test_project_renders_role_policy_and_project() {
        let project = BuildProject::new("SiteBuildProject", BuildSpec::site(&SiteBuild::default()))
            .with_env("STAGE", json!("prod"));
        let mut template = Template::new();
        project.render(&mut template).unwrap();

        assert_eq!(template.resources.len(), 3);
        assert_eq!(template.resources_of_type("AWS::IAM::Role").count(), 1);
        assert_eq!(template.resources_of_type("AWS::IAM::Policy").count(), 1);

        let resource = template.resource(project.id()).unwrap();
        let env = &resource.properties["Environment"];
        assert_eq!(env["Image"], STANDARD_IMAGE);
        assert_eq!(env["EnvironmentVariables"][0]["Name"], "STAGE");
        assert_eq!(env["EnvironmentVariables"][0]["Type"], "PLAINTEXT");
        assert_eq!(resource.depends_on.len(), 1);
        assert!(template.check_references().is_ok());
    }

    #[test]
    fn test_embedded_buildspec_round_trips() {
        let spec = BuildSpec::site(&SiteBuild::default());
        let project = BuildProject::new("SiteBuildProject", spec.clone());
        let mut template = Template::new();
        project.render(&mut template).unwrap();

        let embedded = template.resource(project.id()).unwrap().properties["Source"]["BuildSpec"]
            .as_str()
            .unwrap()
            .to_string();
        let parsed: BuildSpec = serde_json::from_str(&embedded).unwrap();
        assert_eq!(parsed, spec);
        assert_eq!(embedded, spec.to_json_string().unwrap());
        assert!(!embedded.is_empty());
    }

    #[test]
    fn test_invalid_property_error_names_resource() {
        let project = BuildProject::new("SiteBuildProject", BuildSpec::invalidation("CLOUDFRONT_ID"));
        let err = TemplateError::InvalidProperty {
            id: project.id().clone(),
            reason: "BuildSpec: key must be a string".to_string(),
        };
        assert!(err.to_string().contains(project.id().as_str()));
        assert!(err.to_string().contains("BuildSpec"));
    }
}
