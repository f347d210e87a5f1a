//! Uploads a local directory to the site bucket after the stack is ready,
//! then invalidates the distribution once. Only new or changed files are
//! uploaded (compared by sha256 stored as object metadata) and objects
//! with no local counterpart are deleted.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use sitedeploy::resources::outputs;
use thiserror::Error;
use tracing::{debug, info};

pub mod aws;
pub mod manifest;

pub use aws::{CloudFrontCache, S3Store};
pub use manifest::*;

/// object metadata key holding the hex sha256 of the body
pub const DIGEST_METADATA_KEY: &str = "sha256";
pub const INVALIDATE_ALL: &str = "/*";
/// the most keys a single S3 DeleteObjects call accepts
pub const DELETE_BATCH_SIZE: usize = 1000;
/// digest lookups (S3 HeadObject) in flight at once while planning
pub const DIGEST_LOOKUP_CONCURRENCY: usize = 16;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Source directory {0:?} does not exist or is not a directory")]
    MissingSource(PathBuf),

    #[error("Failed to walk the source directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Cannot turn {0:?} into an object key")]
    InvalidKey(PathBuf),

    #[error("S3 request failed: {0}")]
    Storage(String),

    #[error("Cloudfront request failed: {0}")]
    Cdn(String),

    #[error("Stack output {0} is missing. Has the stack been deployed?")]
    MissingOutput(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// every key in the bucket with its size
    async fn list_objects(&self) -> Result<HashMap<String, u64>, SyncError>;
    /// the digest recorded when the object was uploaded, if any
    async fn object_digest(&self, key: &str) -> Result<Option<String>, SyncError>;
    async fn put_object(&self, asset: &LocalAsset, body: Vec<u8>) -> Result<(), SyncError>;
    async fn delete_objects(&self, keys: &[String]) -> Result<(), SyncError>;
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// returns the invalidation id
    async fn invalidate(&self, paths: &[String], caller_reference: &str) -> Result<String, SyncError>;
}

/// where to sync to, as reported by the stack outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub bucket_name: String,
    pub distribution_id: String,
}

impl SyncTarget {
    pub fn from_outputs(stack_outputs: &HashMap<String, String>) -> Result<Self, SyncError> {
        let get = |key: &str| {
            stack_outputs.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| SyncError::MissingOutput(key.to_string()))
        };
        Ok(Self {
            bucket_name: get(outputs::BUCKET_NAME)?,
            distribution_id: get(outputs::DISTRIBUTION_ID)?,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub upload: Vec<LocalAsset>,
    /// sorted
    pub delete: Vec<String>,
    pub unchanged: usize,
}

pub async fn plan_sync<S: ObjectStore + ?Sized>(store: &S, manifest: &[LocalAsset]) -> Result<SyncPlan, SyncError> {
    let remote = store.list_objects().await?;
    // only objects whose size already matches need their digest looked up
    let candidates = manifest.iter().filter(|a| remote.get(&a.key) == Some(&a.size));
    let remote_digests: HashMap<&str, Option<String>> = stream::iter(candidates)
        .map(|asset| async move {
            let digest = store.object_digest(&asset.key).await?;
            Ok::<_, SyncError>((asset.key.as_str(), digest))
        })
        .buffer_unordered(DIGEST_LOOKUP_CONCURRENCY)
        .try_collect()
        .await?;

    let mut plan = SyncPlan::default();
    for asset in manifest {
        let same = match remote_digests.get(asset.key.as_str()) {
            Some(digest) => digest.as_deref() == Some(asset.sha256.as_str()),
            None => false,
        };
        if same {
            plan.unchanged += 1;
        } else {
            plan.upload.push(asset.clone());
        }
    }
    let local: HashSet<&str> = manifest.iter().map(|a| a.key.as_str()).collect();
    plan.delete = remote.into_keys().filter(|k| !local.contains(k.as_str())).collect();
    plan.delete.sort();
    Ok(plan)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub invalidation_id: String,
}

/// caller references must be unique per invalidation request.
pub fn caller_reference(manifest_digest: &str) -> String {
    let now = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let short = &manifest_digest[..manifest_digest.len().min(12)];
    format!("sitedeploy-{now}-{short}")
}

pub struct AssetSync {
    pub source_dir: PathBuf,
}

impl AssetSync {
    pub fn new(source_dir: &Path) -> Self {
        Self { source_dir: source_dir.to_path_buf() }
    }

    pub async fn run<S, C>(&self, store: &S, cache: &C) -> Result<SyncReport, SyncError>
        where S: ObjectStore + ?Sized,
              C: EdgeCache + ?Sized,
    {
        let source_dir = self.source_dir.clone();
        let manifest = tokio::task::spawn_blocking(move || build_manifest(&source_dir))
            .await
            .map_err(|e| SyncError::Io {
                path: self.source_dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;
        info!(dir = ?self.source_dir, files = manifest.len(), "built local manifest");

        let plan = plan_sync(store, &manifest).await?;
        info!(upload = plan.upload.len(), delete = plan.delete.len(), unchanged = plan.unchanged, "sync plan");

        for asset in &plan.upload {
            let body = tokio::fs::read(&asset.path).await
                .map_err(|source| SyncError::Io { path: asset.path.clone(), source })?;
            debug!(key = %asset.key, size = asset.size, "uploading");
            store.put_object(asset, body).await?;
        }
        for chunk in plan.delete.chunks(DELETE_BATCH_SIZE) {
            debug!(count = chunk.len(), "deleting stale objects");
            store.delete_objects(chunk).await?;
        }

        let reference = caller_reference(&manifest_digest(&manifest));
        let invalidation_id = cache.invalidate(&[INVALIDATE_ALL.to_string()], &reference).await?;
        info!(id = %invalidation_id, "created invalidation for {INVALIDATE_ALL}");

        Ok(SyncReport {
            uploaded: plan.upload.len(),
            deleted: plan.delete.len(),
            unchanged: plan.unchanged,
            invalidation_id,
        })
    }
}
