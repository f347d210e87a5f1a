use super::*;

/// the cloudfront principal that is allowed to read from the site bucket.
pub struct OriginAccessIdentity {
    pub comment: String,
}

impl OriginAccessIdentity {
    pub fn for_stack(stack_name: &str) -> Self {
        Self { comment: format!("OAI for {stack_name}") }
    }
}

impl CfnResource for OriginAccessIdentity {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "CloudFrontOriginAccessIdentityConfig": {
                "Comment": self.comment,
            }
        })
    }
    fn validate(&self) -> Result<(), String> {
        if self.comment.len() > 128 {
            return Err(format!("Origin access identity comment must be at most 128 characters, got {}", self.comment.len()));
        }
        Ok(())
    }
}

/// a handle to an origin access identity that lives in the same template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBinding {
    pub logical_id: String,
}

impl IdentityBinding {
    pub fn new(logical_id: &str) -> Self {
        Self { logical_id: logical_id.to_string() }
    }

    pub fn canonical_user(&self) -> CanonicalUserPrincipal {
        CanonicalUserPrincipal::OriginAccessIdentity(self.logical_id.clone())
    }

    /// the value cloudfront expects in `S3OriginConfig.OriginAccessIdentity`
    pub fn origin_access_path(&self) -> Value {
        sub(&format!("origin-access-identity/cloudfront/${{{}}}", self.logical_id))
    }
}
