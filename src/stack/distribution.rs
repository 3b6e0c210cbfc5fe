//! Content-delivery distribution fronting the site bucket.

use serde_json::{json, Value};

use crate::template::{intrinsic, LogicalId, Resource, Template, TemplateError};

use super::bucket::SiteBucket;
use super::Construct;

/// Managed origin-request policy forwarding all viewer headers
pub const ALL_VIEWER_ORIGIN_REQUEST_POLICY: &str = "216adef6-5c7f-47e4-b989-5492eafa07d3";

/// Managed cache policy tuned for static content
pub const CACHING_OPTIMIZED_POLICY: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

pub const VIEWER_PROTOCOL_POLICY: &str = "redirect-to-https";

#[derive(Debug, Clone)]
pub struct SiteDistribution {
    id: LogicalId,
    origin_bucket: LogicalId,
    origin_domain: Value,
    default_root_object: String,
}

impl SiteDistribution {
    /// Distribution whose single origin is the bucket's website endpoint
    pub fn new(bucket: &SiteBucket) -> Self {
        Self {
            id: LogicalId::from_path(&["SiteDistribution"]),
            origin_bucket: bucket.id().clone(),
            origin_domain: bucket.website_domain(),
            default_root_object: bucket.website().index_document.clone(),
        }
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    pub fn origin_bucket(&self) -> &LogicalId {
        &self.origin_bucket
    }

    /// Distribution identifier, as consumed by the invalidation job
    pub fn distribution_id(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    pub fn domain_name(&self) -> Value {
        intrinsic::get_att(&self.id, "DomainName")
    }

    fn origin_id(&self) -> String {
        format!("{}Origin", self.origin_bucket)
    }
}

impl Construct for SiteDistribution {
    fn name(&self) -> &str {
        "SiteDistribution"
    }

    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        let origin_id = self.origin_id();

        template.add_resource(
            self.id.clone(),
            Resource::new(
                "AWS::CloudFront::Distribution",
                json!({
                    "DistributionConfig": {
                        "Enabled": true,
                        "HttpVersion": "http2",
                        "IPV6Enabled": true,
                        "DefaultRootObject": self.default_root_object,
                        "Origins": [{
                            "Id": origin_id,
                            "DomainName": self.origin_domain,
                            // Website endpoints only speak plain HTTP
                            "CustomOriginConfig": {
                                "OriginProtocolPolicy": "http-only",
                            },
                        }],
                        "DefaultCacheBehavior": {
                            "TargetOriginId": origin_id,
                            "ViewerProtocolPolicy": VIEWER_PROTOCOL_POLICY,
                            "CachePolicyId": CACHING_OPTIMIZED_POLICY,
                            "OriginRequestPolicyId": ALL_VIEWER_ORIGIN_REQUEST_POLICY,
                            "Compress": true,
                        },
                    },
                }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::WebsiteSettings;

    #[test]
    fn test_distribution_config() {
        let bucket = SiteBucket::new(WebsiteSettings::default());
        let distribution = SiteDistribution::new(&bucket);
        let mut template = Template::new();
        bucket.render(&mut template).unwrap();
        distribution.render(&mut template).unwrap();

        let config = &template.resource(distribution.id()).unwrap().properties["DistributionConfig"];
        let behavior = &config["DefaultCacheBehavior"];

        assert_eq!(behavior["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(
            behavior["OriginRequestPolicyId"],
            ALL_VIEWER_ORIGIN_REQUEST_POLICY
        );
        assert_eq!(behavior["TargetOriginId"], config["Origins"][0]["Id"]);
        assert_eq!(config["DefaultRootObject"], "index.html");
        assert_eq!(
            intrinsic::referenced_ids(&config["Origins"][0]["DomainName"]),
            vec![bucket.id().as_str().to_string()]
        );
        assert!(template.check_references().is_ok());
    }
}
