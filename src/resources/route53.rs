use super::*;

/// this is static for all of AWS for aliases to CloudFront
/// see https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

pub struct HostedZone {
    pub name: String,
    pub comment: String,
}

impl CfnResource for HostedZone {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::HostedZone"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "Name": self.name,
            "HostedZoneConfig": { "Comment": self.comment },
        })
    }
    fn validate(&self) -> Result<(), String> {
        match verify_domain_name(&self.name) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

/// points at a provider managed endpoint instead of an address, so route53
/// keeps following the distribution if its addresses change.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub dns_name: Value,
    pub hosted_zone_id: String,
}

impl AliasTarget {
    pub fn cloudfront(distribution_logical_id: &str) -> Self {
        Self {
            dns_name: get_att(distribution_logical_id, "DomainName"),
            hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_string(),
        }
    }
}

pub struct AliasRecord {
    pub record_type: RecordType,
    pub name: String,
    pub hosted_zone_logical_id: String,
    pub alias_target: AliasTarget,
}

impl CfnResource for AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "HostedZoneId": get_ref(&self.hosted_zone_logical_id),
            "Name": self.name,
            "Type": self.record_type.as_str(),
            "AliasTarget": {
                "DNSName": self.alias_target.dns_name,
                "HostedZoneId": self.alias_target.hosted_zone_id,
                "EvaluateTargetHealth": false,
            },
        })
    }
    fn validate(&self) -> Result<(), String> {
        match verify_domain_name(&self.name) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// the A and AAAA records for `domain`, both aliasing the same distribution
pub fn alias_records(domain: &str, hosted_zone_logical_id: &str, distribution_logical_id: &str) -> [AliasRecord; 2] {
    [RecordType::A, RecordType::Aaaa].map(|record_type| AliasRecord {
        record_type,
        name: domain.to_string(),
        hosted_zone_logical_id: hosted_zone_logical_id.to_string(),
        alias_target: AliasTarget::cloudfront(distribution_logical_id),
    })
}

/// fully qualified, no trailing dot, no wildcard.
pub fn verify_domain_name(domain: &str) -> Option<String> {
    if domain.is_empty() {
        return Some("Domain name must not be empty".to_string());
    }
    if domain.len() > 253 {
        return Some(format!("Invalid domain name {:?}\nMust be at most 253 characters", domain));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Some(format!("Invalid domain name {:?}\nMust be a fully qualified domain, eg: example.com", domain));
    }
    for label in labels {
        if label.is_empty() || label.len() > 63 {
            return Some(format!("Invalid domain name {:?}\nEach label must be between 1 and 63 characters", domain));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Some(format!("Invalid domain name {:?}\nMay only contain letters, numbers, dots, and dashes", domain));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Some(format!("Invalid domain name {:?}\nLabels may not start or end with a dash", domain));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_alias_the_same_distribution() {
        let [a, aaaa] = alias_records("example.com", "SiteZone", "SiteDistribution");
        assert_eq!(a.record_type, RecordType::A);
        assert_eq!(aaaa.record_type, RecordType::Aaaa);
        let (a, aaaa) = (a.properties(), aaaa.properties());
        assert_eq!(a["AliasTarget"], aaaa["AliasTarget"]);
        assert_eq!(a["AliasTarget"]["DNSName"], get_att("SiteDistribution", "DomainName"));
        assert_eq!(a["AliasTarget"]["HostedZoneId"], CLOUDFRONT_HOSTED_ZONE_ID);
        assert_eq!(a["Type"], "A");
        assert_eq!(aaaa["Type"], "AAAA");
        assert_eq!(a["HostedZoneId"], get_ref("SiteZone"));
        assert!(a.get("ResourceRecords").is_none());
    }

    #[test]
    fn domain_validation() {
        assert!(verify_domain_name("rentingorbuy.com").is_none());
        assert!(verify_domain_name("docs.example-site.com").is_none());
        assert!(verify_domain_name("").is_some());
        assert!(verify_domain_name("localhost").is_some());
        assert!(verify_domain_name("example.com.").is_some());
        assert!(verify_domain_name("*.example.com").is_some());
        assert!(verify_domain_name("-bad.example.com").is_some());
        assert!(verify_domain_name(&format!("{}.com", "a".repeat(64))).is_some());
    }
}
