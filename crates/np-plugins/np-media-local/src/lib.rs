//! # np-media-local
//! ngo-portal/crates/np-plugins/np-media-local/src/lib.rs
//! Local filesystem implementation of `AssetStore`.
//! Uploads are stored as `{public_root}/{asset_dir}/{record_id}.{ext}` and
//! referenced as `/{asset_dir}/{record_id}.{ext}`.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mime_guess::mime;
use np_core::error::{AppError, Result};
use np_core::models::{RecordId, Upload};
use np_core::traits::AssetStore;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Path segment under which the public root is served.
pub const STATIC_PREFIX: &str = "static";

pub struct LocalAssetStore {
    /// Public root directory (e.g., "./public"), served under `/static`
    root_path: PathBuf,
    /// Resource-specific sub-directory (e.g., "events")
    asset_dir: String,
    /// Externally addressable host (e.g., "http://localhost:8000")
    base_url: String,
    /// Returned for records without an image
    fallback: String,
}

impl LocalAssetStore {
    pub fn new(
        root: impl Into<PathBuf>,
        asset_dir: &str,
        base_url: &str,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            root_path: root.into(),
            asset_dir: asset_dir.trim_matches('/').to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback: fallback.into(),
        }
    }

    /// Directory holding this resource's uploads.
    pub fn directory(&self) -> PathBuf {
        self.root_path.join(&self.asset_dir)
    }

    /// True when `reference` is `/{asset_dir}/{owner}.{ext}`.
    ///
    /// Shared images such as the seed members' `/owner.png` are not owned by
    /// any record and must survive record deletion.
    pub fn owns(&self, reference: &str, owner: &RecordId) -> bool {
        let relative = reference.strip_prefix('/').unwrap_or(reference);
        let Some(file) = relative
            .strip_prefix(self.asset_dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return false;
        };
        match file.rsplit_once('.') {
            Some((stem, ext)) => stem == owner.as_str() && is_safe_extension(ext),
            None => false,
        }
    }

    /// Absolute location of a reference previously accepted by `owns`.
    pub fn path_of(&self, reference: &str) -> PathBuf {
        self.root_path.join(reference.trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn save(&self, upload: Upload, owner: &RecordId) -> Result<String> {
        let ext = upload_extension(&upload)?;
        let file_name = format!("{owner}.{ext}");
        let target = self.directory().join(&file_name);

        write_replacing(&target, &upload.bytes)
            .await
            .map_err(|source| AppError::AssetIo {
                path: target.display().to_string(),
                source,
            })?;

        info!(path = %target.display(), bytes = upload.bytes.len(), "stored asset");
        Ok(format!("/{}/{}", self.asset_dir, file_name))
    }

    async fn delete(&self, reference: &str, owner: &RecordId) {
        if !self.owns(reference, owner) {
            debug!(reference, owner = %owner, "not an owned asset, leaving it in place");
            return;
        }
        let path = self.path_of(reference);
        match fs::remove_file(&path).await {
            Ok(()) => info!(path = %path.display(), "deleted asset"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "asset already removed")
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete asset"),
        }
    }

    fn public_url(&self, reference: &str) -> String {
        resolve_public_url(reference, &self.base_url, &self.fallback)
    }
}

/// Normalizes a stored image reference into one fetchable URL.
///
/// Absolute URLs pass through. Paths (with or without a leading `/` or the
/// `static/` prefix) are placed under `{base_url}/static/`. An empty
/// reference resolves to `fallback`.
pub fn resolve_public_url(reference: &str, base_url: &str, fallback: &str) -> String {
    let reference = reference.trim();
    if reference.is_empty() {
        return fallback.to_string();
    }
    if has_url_scheme(reference) {
        return reference.to_string();
    }

    let relative = reference.strip_prefix('/').unwrap_or(reference);
    let base = base_url.trim_end_matches('/');
    let already_static = relative
        .strip_prefix(STATIC_PREFIX)
        .is_some_and(|rest| rest.starts_with('/'));

    if already_static {
        format!("{base}/{relative}")
    } else {
        format!("{base}/{STATIC_PREFIX}/{relative}")
    }
}

fn has_url_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Extension of the client file name, or one derived from the content type.
/// Only image types are accepted.
fn upload_extension(upload: &Upload) -> Result<String> {
    let from_name = Path::new(&upload.file_name)
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);

    let ext = match from_name {
        Some(ext) => ext,
        None => upload
            .content_type
            .as_deref()
            .and_then(extension_for_content_type)
            .ok_or_else(|| {
                AppError::validation(format!(
                    "cannot determine a file extension for '{}'",
                    upload.file_name
                ))
            })?,
    };

    if !is_safe_extension(&ext) {
        return Err(AppError::validation(format!("invalid file extension '{ext}'")));
    }
    match mime_guess::from_ext(&ext).first() {
        Some(guess) if guess.type_() == mime::IMAGE => Ok(ext),
        _ => Err(AppError::validation(format!(
            "unsupported image type '.{ext}'"
        ))),
    }
}

fn extension_for_content_type(content_type: &str) -> Option<String> {
    let exts = mime_guess::get_mime_extensions_str(content_type)?;
    let subtype = content_type.split('/').nth(1).unwrap_or_default();
    exts.iter()
        .find(|ext| **ext == subtype)
        .or_else(|| exts.first())
        .map(|ext| ext.to_string())
}

/// Writes to a temporary sibling and renames it over `target`, replacing
/// any previous upload for the same record.
async fn write_replacing(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "asset path has no parent"))?;
    fs::create_dir_all(dir).await?;

    let tmp = dir.join(format!(".upload-{}.tmp", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, target).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
