use std::{fmt, str::FromStr};

use super::*;
use crate::regions::CLOUDFRONT_CERTIFICATE_REGION;

const VALID_PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-us-gov"];

/// a parsed `arn:<partition>:acm:<region>:<account>:certificate/<id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateArn {
    pub partition: String,
    pub region: String,
    pub account_id: String,
    pub certificate_id: String,
}

impl FromStr for CertificateArn {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| DescriptorError::InvalidCertificate(format!("{:?} is not an ACM certificate ARN: {why}", s));
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" {
            return Err(invalid("expected arn:<partition>:acm:<region>:<account>:certificate/<id>"));
        }
        let (partition, service, region, account_id, resource) = (parts[1], parts[2], parts[3], parts[4], parts[5]);
        if !VALID_PARTITIONS.contains(&partition) {
            return Err(invalid("unknown partition"));
        }
        if service != "acm" {
            return Err(invalid("service must be acm"));
        }
        if region.is_empty() {
            return Err(invalid("missing region"));
        }
        if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("account id must be 12 digits"));
        }
        let certificate_id = match resource.strip_prefix("certificate/") {
            Some(id) => id,
            None => return Err(invalid("resource must be certificate/<id>")),
        };
        if certificate_id.is_empty() || !certificate_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("certificate id must be alphanumeric with dashes"));
        }
        Ok(Self {
            partition: partition.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            certificate_id: certificate_id.to_string(),
        })
    }
}

impl fmt::Display for CertificateArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arn:{}:acm:{}:{}:certificate/{}", self.partition, self.region, self.account_id, self.certificate_id)
    }
}

impl CertificateArn {
    pub fn verify_cloudfront_region(&self) -> Result<(), DescriptorError> {
        if self.region != CLOUDFRONT_CERTIFICATE_REGION {
            return Err(DescriptorError::InvalidCertificate(format!(
                "Certificate {self} is in {}, but cloudfront only accepts certificates from {CLOUDFRONT_CERTIFICATE_REGION}",
                self.region,
            )));
        }
        Ok(())
    }
}

/// an externally issued certificate plus the one domain it is expected to serve.
/// nothing here issues or renews certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateReference {
    pub arn: CertificateArn,
    pub domain_name: String,
}

impl CertificateReference {
    pub fn new(arn: &str, domain_name: &str) -> Result<Self, DescriptorError> {
        let arn: CertificateArn = arn.trim().parse()?;
        arn.verify_cloudfront_region()?;
        if let Some(err) = verify_domain_name(domain_name) {
            return Err(DescriptorError::InvalidConfig(err));
        }
        Ok(Self { arn, domain_name: domain_name.to_ascii_lowercase() })
    }

    pub fn viewer_certificate(&self) -> ViewerCertificate {
        ViewerCertificate {
            acm_certificate_arn: self.arn.to_string(),
            alias: self.domain_name.clone(),
        }
    }
}

/// what the distribution presents to viewers for its custom alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerCertificate {
    pub acm_certificate_arn: String,
    pub alias: String,
}

impl ViewerCertificate {
    pub fn aliases(&self) -> Vec<String> {
        vec![self.alias.clone()]
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "AcmCertificateArn": self.acm_certificate_arn,
            "MinimumProtocolVersion": "TLSv1.2_2021",
            "SslSupportMethod": "sni-only",
        })
    }
}

/// true if a certificate issued for `certificate_name` is valid for `domain`.
/// wildcards only match a single leftmost label.
pub fn certificate_covers_domain(certificate_name: &str, domain: &str) -> bool {
    let certificate_name = certificate_name.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if certificate_name == domain {
        return true;
    }
    match (certificate_name.strip_prefix("*."), domain.split_once('.')) {
        (Some(parent), Some((label, rest))) => !label.is_empty() && parent == rest,
        _ => false,
    }
}

/// checks that at least one of the names on a certificate covers `domain`.
pub fn verify_certificate_covers(names: &[String], domain: &str) -> Result<(), DescriptorError> {
    if names.iter().any(|n| certificate_covers_domain(n, domain)) {
        return Ok(());
    }
    Err(DescriptorError::DomainMismatch {
        certificate_domain: names.join(", "),
        site_domain: domain.to_string(),
    })
}
