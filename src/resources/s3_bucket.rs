use super::*;

/// the private bucket holding the site's files.
pub struct ObjectStore {
    pub index_document: String,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self { index_document: "index.html".into() }
    }
}

impl CfnResource for ObjectStore {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> Value {
        // the name is left to cloudformation. every public access path is
        // closed, the only reader is whoever the bucket policy names.
        serde_json::json!({
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "WebsiteConfiguration": {
                "IndexDocument": self.index_document,
            },
        })
    }
    fn validate(&self) -> Result<(), String> {
        verify_document_name(&self.index_document)
    }
}

pub fn verify_document_name(document: &str) -> Result<(), String> {
    if document.is_empty() {
        return Err("Index document must not be empty".into());
    }
    if document.starts_with('/') || document.contains('\\') {
        return Err(format!("Index document {:?} must be a relative object key", document));
    }
    Ok(())
}

pub const CLEANUP_FUNCTION_SOURCE: &str = r#"const { S3Client, ListObjectsV2Command, DeleteObjectsCommand } = require('@aws-sdk/client-s3');
const response = require('cfn-response');
const s3 = new S3Client({});
async function emptyBucket(bucketName) {
    let token = undefined;
    do {
        const page = await s3.send(new ListObjectsV2Command({ Bucket: bucketName, ContinuationToken: token }));
        const objects = (page.Contents || []).map((o) => ({ Key: o.Key }));
        if (objects.length > 0) {
            await s3.send(new DeleteObjectsCommand({ Bucket: bucketName, Delete: { Objects: objects, Quiet: true } }));
        }
        token = page.NextContinuationToken;
    } while (token);
}
exports.handler = async function(event, context) {
    let responseType = response.SUCCESS;
    if (event.RequestType == 'Delete') {
        try {
            await emptyBucket(event.ResourceProperties.BucketName);
        } catch (err) {
            console.log(`Error emptying bucket: ${err}`);
            responseType = response.FAILED;
        }
    }
    await response.send(event, context, responseType);
};
"#;

/// role assumed by the cleanup function. Only list + delete on the site bucket.
pub struct CleanupRole {
    pub bucket_logical_id: String,
    pub description: String,
}

impl CfnResource for CleanupRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> Value {
        let bucket = &self.bucket_logical_id;
        serde_json::json!({
            "Description": self.description,
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": [
                sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
            ],
            "Policies": [{
                "PolicyName": "site-bucket-cleanup",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Effect": "Allow",
                            "Action": "s3:ListBucket",
                            "Resource": get_att(bucket, "Arn"),
                        },
                        {
                            "Effect": "Allow",
                            "Action": "s3:DeleteObject",
                            "Resource": sub(&format!("arn:${{AWS::Partition}}:s3:::${{{bucket}}}/*")),
                        },
                    ],
                },
            }],
        })
    }
}

pub struct CleanupFunction {
    pub role_logical_id: String,
}

impl CfnResource for CleanupFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "Runtime": "nodejs20.x",
            "Handler": "index.handler",
            "Timeout": 300,
            "Role": get_att(&self.role_logical_id, "Arn"),
            "Code": { "ZipFile": CLEANUP_FUNCTION_SOURCE },
        })
    }
}

/// custom resource whose delete event empties the bucket, so the stack
/// can remove the bucket on teardown.
pub struct CleanupResource {
    pub function_logical_id: String,
    pub bucket_logical_id: String,
}

impl CfnResource for CleanupResource {
    fn type_string(&self) -> &'static str {
        "Custom::cleanupbucket"
    }
    fn properties(&self) -> Value {
        serde_json::json!({
            "ServiceToken": get_att(&self.function_logical_id, "Arn"),
            "BucketName": get_ref(&self.bucket_logical_id),
        })
    }
}
