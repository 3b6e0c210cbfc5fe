//! Static-site bucket: public website hosting, removed with the stack.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{PolicyDocument, PolicyStatement};
use crate::template::{intrinsic, LogicalId, RemovalPolicy, Resource, Template, TemplateError};

use super::Construct;

/// Website documents served by the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteSettings {
    #[serde(default = "default_index_document")]
    pub index_document: String,

    #[serde(default = "default_error_document")]
    pub error_document: String,
}

fn default_index_document() -> String {
    "index.html".to_string()
}

fn default_error_document() -> String {
    "error.html".to_string()
}

impl Default for WebsiteSettings {
    fn default() -> Self {
        Self {
            index_document: default_index_document(),
            error_document: default_error_document(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteBucket {
    id: LogicalId,
    policy_id: LogicalId,
    website: WebsiteSettings,
}

impl SiteBucket {
    pub fn new(website: WebsiteSettings) -> Self {
        Self {
            id: LogicalId::from_path(&["SiteBucket"]),
            policy_id: LogicalId::from_path(&["SiteBucket", "Policy"]),
            website,
        }
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    pub fn website(&self) -> &WebsiteSettings {
        &self.website
    }

    pub fn website_url(&self) -> Value {
        intrinsic::get_att(&self.id, "WebsiteURL")
    }

    /// Website endpoint host, i.e. the website URL without its scheme
    pub fn website_domain(&self) -> Value {
        intrinsic::select(2, intrinsic::split("/", self.website_url()))
    }

    pub fn arn(&self) -> Value {
        intrinsic::get_att(&self.id, "Arn")
    }
}

impl Construct for SiteBucket {
    fn name(&self) -> &str {
        "SiteBucket"
    }

    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        template.add_resource(
            self.id.clone(),
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "WebsiteConfiguration": {
                        "IndexDocument": self.website.index_document,
                        "ErrorDocument": self.website.error_document,
                    },
                    // Public reads come from the bucket policy, never from ACLs
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": true,
                        "IgnorePublicAcls": true,
                        "BlockPublicPolicy": false,
                        "RestrictPublicBuckets": false,
                    },
                }),
            )
            .with_removal_policy(RemovalPolicy::Delete),
        )?;

        let policy = PolicyDocument::new(vec![PolicyStatement::public_read(&self.id)]);
        template.add_resource(
            self.policy_id.clone(),
            Resource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": intrinsic::reference(&self.id),
                    "PolicyDocument": policy.render(),
                }),
            )
            .depends_on(&self.id),
        )
    }
}
