//! Resolves an externally issued ACM certificate before a deploy touches
//! the stack. The certificate must exist, be issued, and cover the site
//! domain. Nothing here requests, validates or renews certificates.

use async_trait::async_trait;
use aws_sdk_acm::{error::DisplayErrorContext, Client};
use sitedeploy::{
    resources::{verify_certificate_covers, CertificateReference},
    DescriptorError,
};
use thiserror::Error;
use tracing::{debug, info};

pub const STATUS_ISSUED: &str = "ISSUED";

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("ACM request failed: {0}")]
    Sdk(String),

    #[error("Certificate {0} does not exist")]
    NotFound(String),

    #[error("Certificate {arn} is {status}, it must be {STATUS_ISSUED} before it can be used")]
    NotIssued { arn: String, status: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub arn: String,
    pub status: String,
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
}

impl CertificateDetails {
    /// every name the certificate is valid for
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.domain_name.clone()];
        for san in &self.subject_alternative_names {
            if !names.contains(san) {
                names.push(san.clone());
            }
        }
        names
    }
}

#[async_trait]
pub trait CertificateLookup {
    /// `Ok(None)` when the certificate does not exist.
    async fn describe(&self, arn: &str) -> Result<Option<CertificateDetails>, CertificateError>;
}

/// looks certificates up in ACM. The client is built for the region
/// embedded in the ARN.
pub struct AcmLookup {
    client: Client,
}

impl AcmLookup {
    pub async fn for_certificate(reference: &CertificateReference) -> Self {
        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(reference.arn.region.clone()))
            .load()
            .await;
        Self::new(Client::new(&shared_config))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CertificateLookup for AcmLookup {
    async fn describe(&self, arn: &str) -> Result<Option<CertificateDetails>, CertificateError> {
        let res = self.client.describe_certificate().certificate_arn(arn).send().await;
        let out = match res {
            Ok(out) => out,
            Err(e) => {
                if let Some(service_err) = e.as_service_error() {
                    if service_err.is_resource_not_found_exception() {
                        return Ok(None);
                    }
                }
                return Err(CertificateError::Sdk(format!("{}", DisplayErrorContext(&e))));
            }
        };
        let detail = match out.certificate() {
            Some(detail) => detail,
            None => return Ok(None),
        };
        Ok(Some(CertificateDetails {
            arn: detail.certificate_arn().unwrap_or(arn).to_string(),
            status: detail.status().map(|s| s.as_str().to_string()).unwrap_or_default(),
            domain_name: detail.domain_name().unwrap_or_default().to_string(),
            subject_alternative_names: detail.subject_alternative_names().to_vec(),
        }))
    }
}

/// fails if the certificate is missing, not yet issued, or does not
/// cover the domain of the reference.
pub async fn resolve_certificate<L: CertificateLookup + ?Sized>(
    lookup: &L,
    reference: &CertificateReference,
) -> Result<CertificateDetails, CertificateError> {
    let arn = reference.arn.to_string();
    debug!(arn = %arn, "describing certificate");
    let details = match lookup.describe(&arn).await? {
        Some(details) => details,
        None => return Err(CertificateError::NotFound(arn)),
    };
    if details.status != STATUS_ISSUED {
        return Err(CertificateError::NotIssued { arn, status: details.status });
    }
    verify_certificate_covers(&details.names(), &reference.domain_name)?;
    info!(arn = %arn, domain = %reference.domain_name, "certificate is issued and covers the domain");
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/0b5f2f61-2a6e-4b5e-9a1d-4d3a8f0c1e2b";

    #[derive(Default)]
    struct FakeAcm {
        certs: HashMap<String, CertificateDetails>,
    }

    impl FakeAcm {
        fn with(status: &str, domain: &str, sans: &[&str]) -> Self {
            let mut certs = HashMap::new();
            certs.insert(ARN.to_string(), CertificateDetails {
                arn: ARN.to_string(),
                status: status.to_string(),
                domain_name: domain.to_string(),
                subject_alternative_names: sans.iter().map(|s| s.to_string()).collect(),
            });
            Self { certs }
        }
    }

    #[async_trait]
    impl CertificateLookup for FakeAcm {
        async fn describe(&self, arn: &str) -> Result<Option<CertificateDetails>, CertificateError> {
            Ok(self.certs.get(arn).cloned())
        }
    }

    fn reference(domain: &str) -> CertificateReference {
        CertificateReference::new(ARN, domain).unwrap()
    }

    #[tokio::test]
    async fn issued_certificate_for_the_domain_resolves() {
        let acm = FakeAcm::with("ISSUED", "example.com", &["example.com"]);
        let details = resolve_certificate(&acm, &reference("example.com")).await.unwrap();
        assert_eq!(details.arn, ARN);
    }

    #[tokio::test]
    async fn wildcard_san_covers_subdomain() {
        let acm = FakeAcm::with("ISSUED", "example.com", &["example.com", "*.example.com"]);
        assert!(resolve_certificate(&acm, &reference("www.example.com")).await.is_ok());
        let err = resolve_certificate(&acm, &reference("a.b.example.com")).await.unwrap_err();
        assert!(matches!(err, CertificateError::Descriptor(DescriptorError::DomainMismatch { .. })));
    }

    #[tokio::test]
    async fn missing_certificate_is_rejected() {
        let acm = FakeAcm::default();
        let err = resolve_certificate(&acm, &reference("example.com")).await.unwrap_err();
        assert!(matches!(err, CertificateError::NotFound(arn) if arn == ARN));
    }

    #[tokio::test]
    async fn pending_certificate_is_rejected() {
        let acm = FakeAcm::with("PENDING_VALIDATION", "example.com", &[]);
        let err = resolve_certificate(&acm, &reference("example.com")).await.unwrap_err();
        assert!(matches!(err, CertificateError::NotIssued { status, .. } if status == "PENDING_VALIDATION"));
    }

    #[tokio::test]
    async fn other_domain_is_a_mismatch() {
        let acm = FakeAcm::with("ISSUED", "other.com", &["other.com"]);
        let err = resolve_certificate(&acm, &reference("example.com")).await.unwrap_err();
        match err {
            CertificateError::Descriptor(DescriptorError::DomainMismatch { certificate_domain, site_domain }) => {
                assert_eq!(certificate_domain, "other.com");
                assert_eq!(site_domain, "example.com");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn names_are_deduplicated() {
        let acm = FakeAcm::with("ISSUED", "example.com", &["example.com", "www.example.com"]);
        assert_eq!(acm.certs[ARN].names(), vec!["example.com", "www.example.com"]);
    }
}
