use super::*;

pub const READ_OBJECT_ACTION: &str = "s3:GetObject";

/// who the read grant is scoped to. Only canonical users are accepted:
/// there is deliberately no variant for `*` or an AWS account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalUserPrincipal {
    /// the `S3CanonicalUserId` attribute of an origin access identity in this template
    OriginAccessIdentity(String),
    /// an already known canonical user id (64 hex characters)
    Literal(String),
}

impl CanonicalUserPrincipal {
    pub fn verify(&self) -> Result<(), String> {
        match self {
            CanonicalUserPrincipal::OriginAccessIdentity(logical_id) => {
                match verify_resource_name(logical_id) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            CanonicalUserPrincipal::Literal(id) => {
                if id.len() != 64 || !id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
                    return Err(format!("Canonical user id {:?} must be 64 lowercase hexadecimal characters", id));
                }
                Ok(())
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            CanonicalUserPrincipal::OriginAccessIdentity(logical_id) => get_att(logical_id, "S3CanonicalUserId"),
            CanonicalUserPrincipal::Literal(id) => Value::String(id.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct PolicyStatement {
    principal: CanonicalUserPrincipal,
    resource: Value,
}

impl PolicyStatement {
    fn to_value(&self) -> Value {
        serde_json::json!({
            "Effect": "Allow",
            "Action": READ_OBJECT_ACTION,
            "Resource": self.resource,
            "Principal": { "CanonicalUser": self.principal.to_value() },
        })
    }
}

/// the site bucket's resource policy. It can only be built through
/// [`compose_read_policy`], so it never holds more than the single read grant.
#[derive(Debug, Clone)]
pub struct BucketPolicy {
    bucket_logical_id: String,
    statement: PolicyStatement,
}

impl BucketPolicy {
    pub fn bucket_logical_id(&self) -> &str {
        &self.bucket_logical_id
    }
    pub fn principal(&self) -> &CanonicalUserPrincipal {
        &self.statement.principal
    }
}

impl CfnResource for BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "Bucket": get_ref(&self.bucket_logical_id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [self.statement.to_value()],
            }
        })
    }
    fn validate(&self) -> Result<(), String> {
        self.statement.principal.verify()
    }
}

/// grants `s3:GetObject` on every key of the bucket to exactly one canonical
/// user, and nothing else. A malformed principal is an error rather than
/// a broader grant.
pub fn compose_read_policy(principal: &CanonicalUserPrincipal, bucket_logical_id: &str) -> Result<BucketPolicy, DescriptorError> {
    principal.verify().map_err(DescriptorError::InvalidPrincipal)?;
    if let Some(err) = verify_resource_name(bucket_logical_id) {
        return Err(DescriptorError::InvalidResource { name: bucket_logical_id.to_string(), message: err });
    }
    let resource = sub(&format!("arn:${{AWS::Partition}}:s3:::${{{bucket_logical_id}}}/*"));
    Ok(BucketPolicy {
        bucket_logical_id: bucket_logical_id.to_string(),
        statement: PolicyStatement {
            principal: principal.clone(),
            resource,
        },
    })
}
