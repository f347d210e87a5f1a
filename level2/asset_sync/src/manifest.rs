use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::SyncError;

/// one local file, keyed by its path relative to the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    /// hex encoded
    pub sha256: String,
    pub content_type: &'static str,
}

/// every regular file under `start_dir`. Symlinks are followed, a link
/// back to one of its own ancestors is an error.
pub fn collect_files(start_dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut files = vec![];
    for entry in WalkDir::new(start_dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// `root/css/site.css` -> `css/site.css`, always with `/` separators.
pub fn object_key(root: &Path, path: &Path) -> Result<String, SyncError> {
    let invalid = || SyncError::InvalidKey(path.to_path_buf());
    let relative = path.strip_prefix(root).map_err(|_| invalid())?;
    let mut parts = vec![];
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            _ => return Err(invalid()),
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

pub fn content_type_for(key: &str) -> &'static str {
    let ext = match key.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "webmanifest" => "application/manifest+json",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hash_file(root: &Path, path: PathBuf) -> Result<LocalAsset, SyncError> {
    let key = object_key(root, &path)?;
    let bytes = std::fs::read(&path).map_err(|source| SyncError::Io { path: path.clone(), source })?;
    Ok(LocalAsset {
        content_type: content_type_for(&key),
        size: bytes.len() as u64,
        sha256: digest_bytes(&bytes),
        key,
        path,
    })
}

/// every file under `source_dir`, hashed in parallel and sorted by key.
pub fn build_manifest(source_dir: &Path) -> Result<Vec<LocalAsset>, SyncError> {
    if !source_dir.is_dir() {
        return Err(SyncError::MissingSource(source_dir.to_path_buf()));
    }
    let mut assets = collect_files(source_dir)?
        .into_par_iter()
        .map(|path| hash_file(source_dir, path))
        .collect::<Result<Vec<_>, _>>()?;
    assets.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(assets)
}

/// a digest of the whole manifest: changes whenever any key or content changes.
pub fn manifest_digest(assets: &[LocalAsset]) -> String {
    let mut hasher = Sha256::new();
    for asset in assets {
        hasher.update(asset.key.as_bytes());
        hasher.update([0u8]);
        hasher.update(asset.sha256.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
