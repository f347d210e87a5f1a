use super::*;
use crate::config::SiteConfig;

pub mod logical_ids {
    pub const ORIGIN_ACCESS_IDENTITY: &str = "SiteOriginAccessIdentity";
    pub const BUCKET: &str = "SiteBucket";
    pub const BUCKET_POLICY: &str = "SiteBucketPolicy";
    pub const DISTRIBUTION: &str = "SiteDistribution";
    pub const HOSTED_ZONE: &str = "SiteHostedZone";
    pub const RECORD_A: &str = "SiteAliasRecordA";
    pub const RECORD_AAAA: &str = "SiteAliasRecordAAAA";
    pub const CLEANUP_ROLE: &str = "SiteBucketCleanupRole";
    pub const CLEANUP_FUNCTION: &str = "SiteBucketCleanupFunction";
    pub const CLEANUP_RESOURCE: &str = "SiteBucketCleanup";
}

/// names of the stack outputs the post-deploy steps read back.
pub mod outputs {
    pub const BUCKET_NAME: &str = "BucketName";
    pub const DISTRIBUTION_ID: &str = "DistributionId";
    pub const DISTRIBUTION_DOMAIN_NAME: &str = "DistributionDomainName";
    pub const NAME_SERVERS: &str = "HostedZoneNameServers";
}

/// The whole hosting topology for one site: origin access identity,
/// private bucket and its policy, the distribution, the hosted zone and
/// its alias records. The certificate is optional; without one the site is
/// served on the generated cloudfront domain only, but the records are still
/// created so the zone is ready once a certificate is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDescriptor {
    pub stack_name: String,
    pub domain_name: String,
    pub index_document: String,
    pub price_class: PriceClass,
    pub certificate: Option<CertificateReference>,
    pub cleanup_on_teardown: bool,
    pub comment: String,
}

impl SiteDescriptor {
    pub fn from_config(conf: &SiteConfig) -> Result<Self, DescriptorError> {
        // the certificate reference lowercases its domain, so the descriptor must too
        let mut conf = conf.clone();
        conf.normalize();
        conf.validate()?;
        let certificate = match &conf.certificate_arn {
            Some(arn) => Some(CertificateReference::new(arn, &conf.domain_name)?),
            None => None,
        };
        let comment = conf.comment.clone().unwrap_or_else(|| format!("static site {}", conf.domain_name));
        Ok(Self {
            stack_name: conf.stack_name.clone(),
            domain_name: conf.domain_name.clone(),
            index_document: conf.index_document.clone(),
            price_class: conf.price_class,
            certificate,
            cleanup_on_teardown: conf.cleanup_on_teardown,
            comment,
        })
    }

    pub fn stack_input(&self) -> Result<StackInput, DescriptorError> {
        use logical_ids::*;

        if let Some(cert) = &self.certificate {
            // the alias the distribution answers for and the records must be
            // the same name, or the edge rejects the TLS handshake
            if cert.domain_name != self.domain_name {
                return Err(DescriptorError::DomainMismatch {
                    certificate_domain: cert.domain_name.clone(),
                    site_domain: self.domain_name.clone(),
                });
            }
        }

        let mut stack = StackInput {
            description: Some(self.comment.clone()),
            ..Default::default()
        };

        let identity = IdentityBinding::new(ORIGIN_ACCESS_IDENTITY);
        stack.push(ORIGIN_ACCESS_IDENTITY, OriginAccessIdentity::for_stack(&self.stack_name), &[]);

        let bucket = ObjectStore { index_document: self.index_document.clone() };
        stack.push(BUCKET, bucket, &[]);

        let policy = compose_read_policy(&identity.canonical_user(), BUCKET)?;
        stack.push(BUCKET_POLICY, policy, &[ORIGIN_ACCESS_IDENTITY, BUCKET]);

        let distribution = Distribution {
            comment: self.comment.clone(),
            bucket_logical_id: BUCKET.to_string(),
            identity: identity.clone(),
            default_root_object: self.index_document.clone(),
            price_class: self.price_class,
            viewer_certificate: self.certificate.as_ref().map(|c| c.viewer_certificate()),
        };
        stack.push(DISTRIBUTION, distribution, &[ORIGIN_ACCESS_IDENTITY, BUCKET, BUCKET_POLICY]);

        stack.push(HOSTED_ZONE, HostedZone {
            name: self.domain_name.clone(),
            comment: format!("zone for {}", self.stack_name),
        }, &[]);
        let [a, aaaa] = alias_records(&self.domain_name, HOSTED_ZONE, DISTRIBUTION);
        stack.push(RECORD_A, a, &[HOSTED_ZONE, DISTRIBUTION]);
        stack.push(RECORD_AAAA, aaaa, &[HOSTED_ZONE, DISTRIBUTION]);

        if self.cleanup_on_teardown {
            stack.push(CLEANUP_ROLE, CleanupRole {
                bucket_logical_id: BUCKET.to_string(),
                description: format!("empties the site bucket of {} on teardown", self.stack_name),
            }, &[BUCKET]);
            stack.push(CLEANUP_FUNCTION, CleanupFunction {
                role_logical_id: CLEANUP_ROLE.to_string(),
            }, &[CLEANUP_ROLE]);
            stack.push(CLEANUP_RESOURCE, CleanupResource {
                function_logical_id: CLEANUP_FUNCTION.to_string(),
                bucket_logical_id: BUCKET.to_string(),
            }, &[CLEANUP_FUNCTION, BUCKET]);
        }

        stack.add_output(outputs::BUCKET_NAME, "bucket the site files are synced into", get_ref(BUCKET));
        stack.add_output(outputs::DISTRIBUTION_ID, "distribution invalidated after each sync", get_ref(DISTRIBUTION));
        stack.add_output(outputs::DISTRIBUTION_DOMAIN_NAME, "generated cloudfront domain", get_att(DISTRIBUTION, "DomainName"));
        stack.add_output(outputs::NAME_SERVERS, "delegate the domain to these name servers", serde_json::json!({
            "Fn::Join": [",", get_att(HOSTED_ZONE, "NameServers")],
        }));
        Ok(stack)
    }

    pub fn synthesize(&self) -> Result<SavedTemplate, DescriptorError> {
        let template = self.stack_input()?.to_template()?;
        tracing::debug!(
            stack = %self.stack_name,
            resources = template.resources.len(),
            certificate = self.certificate.is_some(),
            "synthesized site template",
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logical_ids::*;

    const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/8d3f9e2a-0000-4000-8000-000000000001";

    fn config(certificate_arn: Option<&str>) -> SiteConfig {
        let mut conf = SiteConfig {
            domain_name: "example.com".into(),
            certificate_arn: certificate_arn.map(str::to_string),
            ..Default::default()
        };
        conf.normalize();
        conf
    }

    fn synth(conf: &SiteConfig) -> SavedTemplate {
        SiteDescriptor::from_config(conf).unwrap().synthesize().unwrap()
    }

    fn dist_config(template: &SavedTemplate) -> &Value {
        &template.resources[DISTRIBUTION].properties["DistributionConfig"]
    }

    #[test]
    fn bucket_policy_grants_only_the_identity() {
        let template = synth(&config(None));
        let policies: Vec<_> = template.resources_of_type("AWS::S3::BucketPolicy").collect();
        assert_eq!(policies.len(), 1);
        let statements = policies[0].1.properties["PolicyDocument"]["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Action"], "s3:GetObject");
        assert_eq!(
            statements[0]["Principal"],
            serde_json::json!({ "CanonicalUser": get_att(ORIGIN_ACCESS_IDENTITY, "S3CanonicalUserId") })
        );
        let block = &template.resources[BUCKET].properties["PublicAccessBlockConfiguration"];
        assert_eq!(block["BlockPublicPolicy"], true);
        assert_eq!(block["RestrictPublicBuckets"], true);
    }

    #[test]
    fn no_certificate_scenario() {
        let template = synth(&config(None));
        let dist = dist_config(&template);
        assert!(dist.get("Aliases").is_none());
        assert_eq!(dist["ViewerCertificate"]["CloudFrontDefaultCertificate"], true);
        // records are still created
        assert_eq!(template.resources_of_type("AWS::Route53::RecordSet").count(), 2);
        assert_eq!(template.resources[RECORD_A].properties["Name"], "example.com");
    }

    #[test]
    fn certificate_scenario() {
        let template = synth(&config(Some(ARN)));
        let dist = dist_config(&template);
        assert_eq!(dist["Aliases"], serde_json::json!(["example.com"]));
        assert_eq!(dist["ViewerCertificate"]["AcmCertificateArn"], ARN);
        let records: Vec<_> = template.resources_of_type("AWS::Route53::RecordSet").collect();
        assert_eq!(records.len(), 2);
        for (_, record) in records.iter() {
            assert_eq!(record.properties["Name"], "example.com");
            assert_eq!(record.properties["AliasTarget"]["DNSName"], get_att(DISTRIBUTION, "DomainName"));
        }
        let types: Vec<&str> = records.iter().map(|(_, r)| r.properties["Type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["A", "AAAA"]);
        assert_eq!(template.resources[HOSTED_ZONE].properties["Name"], "example.com");
    }

    #[test]
    fn default_behavior_is_read_only() {
        let template = synth(&config(Some(ARN)));
        assert_eq!(
            dist_config(&template)["DefaultCacheBehavior"]["AllowedMethods"],
            serde_json::json!(["GET", "HEAD", "OPTIONS"])
        );
    }

    #[test]
    fn resources_are_ordered_identity_policy_distribution_records() {
        let template = synth(&config(Some(ARN)));
        let order = template.deployment_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos(ORIGIN_ACCESS_IDENTITY) < pos(BUCKET_POLICY));
        assert!(pos(BUCKET) < pos(BUCKET_POLICY));
        assert!(pos(BUCKET_POLICY) < pos(DISTRIBUTION));
        assert!(pos(DISTRIBUTION) < pos(RECORD_A));
        assert!(pos(DISTRIBUTION) < pos(RECORD_AAAA));
        assert!(template.resources[DISTRIBUTION].depends_on.contains(&BUCKET_POLICY.to_string()));
    }

    #[test]
    fn outputs_feed_the_sync_step() {
        let template = synth(&config(None));
        assert_eq!(template.outputs[outputs::BUCKET_NAME].value, get_ref(BUCKET));
        assert_eq!(template.outputs[outputs::DISTRIBUTION_ID].value, get_ref(DISTRIBUTION));
        assert!(template.outputs.contains_key(outputs::NAME_SERVERS));
    }

    #[test]
    fn cleanup_resources_are_optional() {
        let template = synth(&config(None));
        assert!(template.resources.contains_key(CLEANUP_RESOURCE));
        assert_eq!(template.resources[CLEANUP_RESOURCE].ty, "Custom::cleanupbucket");

        let mut conf = config(None);
        conf.cleanup_on_teardown = false;
        let template = synth(&conf);
        assert!(!template.resources.contains_key(CLEANUP_ROLE));
        assert!(!template.resources.contains_key(CLEANUP_FUNCTION));
        assert!(!template.resources.contains_key(CLEANUP_RESOURCE));
        assert_eq!(template.resources.len(), 7);
    }

    #[test]
    fn mismatched_certificate_domain_is_rejected() {
        let mut descriptor = SiteDescriptor::from_config(&config(Some(ARN))).unwrap();
        descriptor.domain_name = "other.com".into();
        assert!(matches!(descriptor.synthesize(), Err(DescriptorError::DomainMismatch { .. })));
    }

    #[test]
    fn mixed_case_domain_without_normalizing_first() {
        let conf = SiteConfig {
            domain_name: "Example.com".into(),
            certificate_arn: Some(ARN.to_string()),
            ..Default::default()
        };
        let descriptor = SiteDescriptor::from_config(&conf).unwrap();
        assert_eq!(descriptor.domain_name, "example.com");
        assert_eq!(descriptor.stack_name, "example-com-site");
        let template = descriptor.synthesize().unwrap();
        assert_eq!(dist_config(&template)["Aliases"], serde_json::json!(["example.com"]));
        assert_eq!(template.resources[RECORD_A].properties["Name"], "example.com");
    }

    #[test]
    fn bad_certificate_arn_fails_before_synthesis() {
        let conf = config(Some("arn:aws:acm:eu-west-1:123456789012:certificate/abc"));
        assert!(matches!(SiteDescriptor::from_config(&conf), Err(DescriptorError::InvalidCertificate(_))));
    }

    #[test]
    fn template_serializes_with_cloudformation_keys() {
        let template = synth(&config(None));
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(json["Resources"][DISTRIBUTION]["Type"], "AWS::CloudFront::Distribution");
        assert_eq!(json["Resources"][DISTRIBUTION]["DependsOn"][2], BUCKET_POLICY);
        assert!(json["Resources"][HOSTED_ZONE].get("DependsOn").is_none());
        let back: SavedTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(back, template);
    }
}
