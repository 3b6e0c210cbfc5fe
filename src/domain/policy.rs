//! Permission grants attached to execution identities and buckets.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::template::{intrinsic, LogicalId};

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// API calls the invalidation job needs against its distribution
pub const INVALIDATION_ACTIONS: [&str; 5] = [
    "cloudfront:CreateInvalidation",
    "cloudfront:GetDistribution",
    "cloudfront:GetInvalidation",
    "cloudfront:ListInvalidations",
    "cloudfront:ListDistributions",
];

/// Reads a build job needs to fetch its input artifact
pub const ARTIFACT_READ_ACTIONS: [&str; 3] = ["s3:GetObject*", "s3:GetBucket*", "s3:List*"];

/// Writes a build job needs to upload its output artifact
pub const ARTIFACT_WRITE_ACTIONS: [&str; 1] = ["s3:PutObject"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single permission grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,

    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,

    #[serde(rename = "Action")]
    pub actions: Vec<String>,

    #[serde(rename = "Resource")]
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow<A, S>(actions: A, resources: Vec<Value>) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            principal: None,
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Grant the invalidation job access to exactly one distribution
    pub fn invalidation(distribution: &LogicalId) -> Self {
        Self::allow(INVALIDATION_ACTIONS, vec![distribution_arn(distribution)])
    }

    /// Anonymous read of every object in a bucket
    pub fn public_read(bucket: &LogicalId) -> Self {
        Self::allow(["s3:GetObject"], vec![objects_arn(bucket)])
            .with_principal(json!({ "AWS": "*" }))
    }

    /// Read access to a pipeline artifact store
    pub fn artifact_read(store: &LogicalId) -> Self {
        Self::allow(ARTIFACT_READ_ACTIONS, bucket_and_objects(store))
    }

    /// Read and upload access to a pipeline artifact store
    pub fn artifact_read_write(store: &LogicalId) -> Self {
        Self::allow(
            ARTIFACT_READ_ACTIONS.iter().chain(&ARTIFACT_WRITE_ACTIONS).copied(),
            bucket_and_objects(store),
        )
    }

    /// Whether any resource is the bare `*` wildcard
    pub fn is_wildcard(&self) -> bool {
        self.resources.iter().any(|r| r.as_str() == Some("*"))
    }

    /// Whether this statement allows the given API call
    pub fn allows(&self, action: &str) -> bool {
        self.effect == Effect::Allow && self.actions.iter().any(|a| a == action)
    }
}

/// A policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statements,
        }
    }

    pub fn render(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// ARN pattern matching every object in a bucket
pub fn objects_arn(bucket: &LogicalId) -> Value {
    intrinsic::join("", vec![intrinsic::get_att(bucket, "Arn"), json!("/*")])
}

fn bucket_and_objects(bucket: &LogicalId) -> Vec<Value> {
    vec![intrinsic::get_att(bucket, "Arn"), objects_arn(bucket)]
}

/// ARN of a distribution created in the same stack
pub fn distribution_arn(distribution: &LogicalId) -> Value {
    intrinsic::join(
        "",
        vec![
            json!("arn:"),
            intrinsic::pseudo(intrinsic::PARTITION),
            json!(":cloudfront::"),
            intrinsic::pseudo(intrinsic::ACCOUNT_ID),
            json!(":distribution/"),
            intrinsic::reference(distribution),
        ],
    )
}

/// Trust policy letting a service assume a role
pub fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidation_statement_is_scoped() {
        let dist = LogicalId::from_path(&["SiteDistribution"]);
        let statement = PolicyStatement::invalidation(&dist);

        assert!(!statement.is_wildcard());
        assert_eq!(statement.actions.len(), 5);
        assert!(statement.allows("cloudfront:CreateInvalidation"));
        assert!(!statement.allows("s3:PutObject"));
        assert_eq!(
            intrinsic::referenced_ids(&statement.resources[0]),
            vec![dist.as_str().to_string()]
        );
    }

    #[test]
    fn test_wildcard_detection() {
        let broad = PolicyStatement::allow(["cloudfront:CreateInvalidation"], vec![json!("*")]);
        assert!(broad.is_wildcard());
    }

    #[test]
    fn test_deny_allows_nothing() {
        let deny = PolicyStatement {
            effect: Effect::Deny,
            ..PolicyStatement::allow(["s3:PutObject"], vec![json!("arn:aws:s3:::site/*")])
        };
        assert!(!deny.allows("s3:PutObject"));
        assert_eq!(serde_json::to_value(&deny).unwrap()["Effect"], "Deny");
    }

    #[test]
    fn test_artifact_statements() {
        let store = LogicalId::from_path(&["Pipeline", "ArtifactsBucket"]);
        let read = PolicyStatement::artifact_read(&store);
        let write = PolicyStatement::artifact_read_write(&store);

        assert!(read.allows("s3:GetObject*"));
        assert!(!read.allows("s3:PutObject"));
        assert!(write.allows("s3:GetObject*"));
        assert!(write.allows("s3:PutObject"));
        for statement in [&read, &write] {
            assert_eq!(statement.resources.len(), 2);
            assert!(statement
                .resources
                .iter()
                .all(|r| intrinsic::referenced_ids(r) == vec![store.as_str().to_string()]));
        }
    }

    #[test]
    fn test_document_render() {
        let bucket = LogicalId::from_path(&["SiteBucket"]);
        let doc = PolicyDocument::new(vec![PolicyStatement::public_read(&bucket)]);
        let rendered = doc.render();

        assert_eq!(rendered["Version"], POLICY_VERSION);
        assert_eq!(rendered["Statement"][0]["Effect"], "Allow");
        assert_eq!(rendered["Statement"][0]["Principal"]["AWS"], "*");
        assert_eq!(rendered["Statement"][0]["Action"][0], "s3:GetObject");
    }
}
