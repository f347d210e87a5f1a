use serde::{Deserialize, Serialize};

use super::*;

/// managed "CachingOptimized" policy
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
pub const DEFAULT_ORIGIN_ID: &str = "origin0";
pub const READ_ONLY_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];
pub const CACHED_METHODS: &[&str] = &["GET", "HEAD"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceClass {
    #[default]
    #[serde(rename = "PriceClass_100")]
    PriceClass100,
    #[serde(rename = "PriceClass_200")]
    PriceClass200,
    #[serde(rename = "PriceClass_All")]
    PriceClassAll,
}

impl PriceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceClass::PriceClass100 => "PriceClass_100",
            PriceClass::PriceClass200 => "PriceClass_200",
            PriceClass::PriceClassAll => "PriceClass_All",
        }
    }
}

/// a distribution with a single S3 origin, read through an origin access
/// identity, and a single catch-all cache behavior.
pub struct Distribution {
    pub comment: String,
    pub bucket_logical_id: String,
    pub identity: IdentityBinding,
    pub default_root_object: String,
    pub price_class: PriceClass,
    /// when missing the distribution is only reachable at its generated
    /// *.cloudfront.net name
    pub viewer_certificate: Option<ViewerCertificate>,
}

impl Distribution {
    fn default_cache_behavior(&self) -> Value {
        serde_json::json!({
            "TargetOriginId": DEFAULT_ORIGIN_ID,
            "ViewerProtocolPolicy": "redirect-to-https",
            "AllowedMethods": READ_ONLY_METHODS,
            "CachedMethods": CACHED_METHODS,
            "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
            "Compress": true,
        })
    }

    fn origin(&self) -> Value {
        serde_json::json!({
            "Id": DEFAULT_ORIGIN_ID,
            "DomainName": get_att(&self.bucket_logical_id, "RegionalDomainName"),
            "S3OriginConfig": {
                "OriginAccessIdentity": self.identity.origin_access_path(),
            },
        })
    }
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> Value {
        let mut config = serde_json::json!({
            "Enabled": true,
            "Comment": self.comment,
            "DefaultRootObject": self.default_root_object,
            "HttpVersion": "http2",
            "IPV6Enabled": true,
            "PriceClass": self.price_class.as_str(),
            "Origins": [self.origin()],
            "DefaultCacheBehavior": self.default_cache_behavior(),
        });
        let viewer_certificate = match &self.viewer_certificate {
            Some(cert) => {
                config["Aliases"] = serde_json::json!(cert.aliases());
                cert.to_value()
            }
            None => serde_json::json!({ "CloudFrontDefaultCertificate": true }),
        };
        config["ViewerCertificate"] = viewer_certificate;
        serde_json::json!({ "DistributionConfig": config })
    }
    fn validate(&self) -> Result<(), String> {
        if self.comment.len() > 128 {
            return Err(format!("Distribution comment must be at most 128 characters, got {}", self.comment.len()));
        }
        verify_document_name(&self.default_root_object)?;
        if let Some(err) = verify_resource_name(&self.identity.logical_id) {
            return Err(err);
        }
        if let Some(cert) = &self.viewer_certificate {
            if let Some(err) = verify_domain_name(&cert.alias) {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution(viewer_certificate: Option<ViewerCertificate>) -> Distribution {
        Distribution {
            comment: "site".into(),
            bucket_logical_id: "SiteBucket".into(),
            identity: IdentityBinding::new("SiteOai"),
            default_root_object: "index.html".into(),
            price_class: PriceClass::default(),
            viewer_certificate,
        }
    }

    #[test]
    fn default_behavior_is_read_only_and_compressed() {
        let props = distribution(None).properties();
        let behavior = &props["DistributionConfig"]["DefaultCacheBehavior"];
        assert_eq!(behavior["AllowedMethods"], serde_json::json!(["GET", "HEAD", "OPTIONS"]));
        assert_eq!(behavior["Compress"], true);
        assert_eq!(behavior["TargetOriginId"], DEFAULT_ORIGIN_ID);
        assert!(props["DistributionConfig"].get("CacheBehaviors").is_none());
    }

    #[test]
    fn single_origin_goes_through_the_identity() {
        let props = distribution(None).properties();
        let origins = props["DistributionConfig"]["Origins"].as_array().unwrap();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0]["DomainName"], get_att("SiteBucket", "RegionalDomainName"));
        assert_eq!(
            origins[0]["S3OriginConfig"]["OriginAccessIdentity"]["Fn::Sub"],
            "origin-access-identity/cloudfront/${SiteOai}"
        );
        assert!(origins[0].get("CustomOriginConfig").is_none());
    }

    #[test]
    fn no_certificate_means_no_aliases() {
        let props = distribution(None).properties();
        let config = &props["DistributionConfig"];
        assert!(config.get("Aliases").is_none());
        assert_eq!(config["ViewerCertificate"]["CloudFrontDefaultCertificate"], true);
    }

    #[test]
    fn certificate_sets_exactly_one_alias() {
        let cert = ViewerCertificate {
            acm_certificate_arn: "arn:aws:acm:us-east-1:123456789012:certificate/abc".into(),
            alias: "example.com".into(),
        };
        let props = distribution(Some(cert)).properties();
        let config = &props["DistributionConfig"];
        assert_eq!(config["Aliases"], serde_json::json!(["example.com"]));
        assert_eq!(config["ViewerCertificate"]["AcmCertificateArn"], "arn:aws:acm:us-east-1:123456789012:certificate/abc");
        assert!(config["ViewerCertificate"].get("CloudFrontDefaultCertificate").is_none());
    }

    #[test]
    fn price_class_serializes_with_cloudfront_names() {
        let p: PriceClass = serde_json::from_str("\"PriceClass_All\"").unwrap();
        assert_eq!(p, PriceClass::PriceClassAll);
        assert_eq!(PriceClass::PriceClass200.as_str(), "PriceClass_200");
    }
}
