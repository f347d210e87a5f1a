use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_s3::{
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
};
use tracing::warn;

use crate::{EdgeCache, LocalAsset, ObjectStore, SyncError, DIGEST_METADATA_KEY};

/// cloudfront is a global service, its API lives in us-east-1.
const CLOUDFRONT_API_REGION: &str = "us-east-1";

async fn shared_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn from_env(region: &str, bucket: &str) -> Self {
        Self::new(aws_sdk_s3::Client::new(&shared_config(region).await), bucket)
    }

    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        Self { client, bucket: bucket.to_string() }
    }
}

fn storage_err<E: std::error::Error>(e: E) -> SyncError {
    SyncError::Storage(format!("{}", DisplayErrorContext(&e)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self) -> Result<HashMap<String, u64>, SyncError> {
        let mut out = HashMap::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let resp = self.client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(storage_err)?;
            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    let size = obj.size().unwrap_or_default().max(0) as u64;
                    out.insert(key.to_string(), size);
                }
            }
            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(out)
    }

    async fn object_digest(&self, key: &str) -> Result<Option<String>, SyncError> {
        let res = self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        match res {
            Ok(head) => Ok(head.metadata().and_then(|m| m.get(DIGEST_METADATA_KEY)).cloned()),
            Err(e) => {
                if let Some(service_err) = e.as_service_error() {
                    if service_err.is_not_found() {
                        return Ok(None);
                    }
                }
                Err(storage_err(e))
            }
        }
    }

    async fn put_object(&self, asset: &LocalAsset, body: Vec<u8>) -> Result<(), SyncError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&asset.key)
            .content_type(asset.content_type)
            .metadata(DIGEST_METADATA_KEY, &asset.sha256)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), SyncError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            objects.push(ObjectIdentifier::builder().key(key).build().map_err(storage_err)?);
        }
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(storage_err)?;
        let resp = self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(storage_err)?;
        let errors = resp.errors();
        if !errors.is_empty() {
            for err in errors {
                warn!(key = err.key().unwrap_or_default(), message = err.message().unwrap_or_default(), "failed to delete object");
            }
            return Err(SyncError::Storage(format!("Failed to delete {} objects from {}", errors.len(), self.bucket)));
        }
        Ok(())
    }
}

pub struct CloudFrontCache {
    client: aws_sdk_cloudfront::Client,
    distribution_id: String,
}

impl CloudFrontCache {
    pub async fn from_env(distribution_id: &str) -> Self {
        Self::new(aws_sdk_cloudfront::Client::new(&shared_config(CLOUDFRONT_API_REGION).await), distribution_id)
    }

    pub fn new(client: aws_sdk_cloudfront::Client, distribution_id: &str) -> Self {
        Self { client, distribution_id: distribution_id.to_string() }
    }
}

fn cdn_err<E: std::error::Error>(e: E) -> SyncError {
    SyncError::Cdn(format!("{}", aws_sdk_cloudfront::error::DisplayErrorContext(&e)))
}

#[async_trait]
impl EdgeCache for CloudFrontCache {
    async fn invalidate(&self, paths: &[String], caller_reference: &str) -> Result<String, SyncError> {
        let paths = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(cdn_err)?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(cdn_err)?;
        let resp = self.client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(cdn_err)?;
        match resp.invalidation() {
            Some(invalidation) => Ok(invalidation.id().to_string()),
            None => Err(SyncError::Cdn(format!("No invalidation returned for distribution {}", self.distribution_id))),
        }
    }
}
