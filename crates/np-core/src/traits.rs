//! # Core Traits (Ports)
//!
//! Record types implement [`Record`]; storage, media, and auth plugins
//! implement the port traits and are injected into the services.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::form::FormFields;
use crate::models::{RecordId, Upload};

/// A request body for creating or updating a record.
pub trait Payload: DeserializeOwned + Debug + Send + Sized + 'static {
    /// Multipart part names that carry the record's image.
    const UPLOAD_FIELDS: &'static [&'static str] = &["image"];

    fn validate(&self) -> Result<()>;

    /// Builds the payload from multipart text fields, rejecting unknown names.
    fn from_form(form: FormFields) -> Result<Self>;

    /// Id supplied by the client, if any.
    fn requested_id(&self) -> Option<&RecordId> {
        None
    }
}

/// An entry in a file-backed collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    type Draft: Payload;
    type Update: Payload;

    /// Human readable kind used in errors and logs (e.g. "member").
    const KIND: &'static str;
    /// JSON field holding the asset reference.
    const ASSET_FIELD: &'static str;

    fn id(&self) -> &RecordId;
    fn asset(&self) -> Option<&str>;
    fn set_asset(&mut self, reference: Option<String>);

    fn from_draft(id: RecordId, draft: Self::Draft, now: DateTime<Utc>) -> Self;
    fn apply(&mut self, update: Self::Update, now: DateTime<Utc>);

    /// Initial contents written when the backing file does not exist yet.
    fn seed() -> Vec<Self> {
        Vec::new()
    }
}

/// What an update does to the record's asset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetChange {
    Keep,
    Replace(String),
}

/// Record state on both sides of an update.
#[derive(Debug, Clone)]
pub struct Updated<R> {
    pub previous: R,
    pub current: R,
}

/// Persistence contract for one collection of records.
#[async_trait]
pub trait RecordRepo<R: Record>: Send + Sync {
    /// Creates the backing document with `R::seed()` when it is missing.
    async fn ensure_initialized(&self) -> Result<()>;

    /// Loads the whole collection. Unparseable content is `CorruptStore`.
    async fn read_all(&self) -> Result<Vec<R>>;

    /// Replaces the whole collection.
    async fn write_all(&self, records: &[R]) -> Result<()>;

    /// Allocates a fresh, never-before-issued id.
    fn next_id(&self) -> RecordId;

    async fn insert(&self, record: R) -> Result<R>;
    async fn update(&self, id: &RecordId, update: R::Update, asset: AssetChange) -> Result<Updated<R>>;
    async fn remove(&self, id: &RecordId) -> Result<R>;
}

/// Storage contract for uploaded images.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores the upload as `{owner}.{ext}` and returns its reference.
    async fn save(&self, upload: Upload, owner: &RecordId) -> Result<String>;

    /// Best-effort removal of an asset owned by `owner`. Never fails.
    async fn delete(&self, reference: &str, owner: &RecordId);

    /// Externally fetchable URL for a stored reference; an empty
    /// reference yields the placeholder image.
    fn public_url(&self, reference: &str) -> String;
}

/// Bearer token verification for mutating requests.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// False when no credential is configured and every request passes.
    fn is_enabled(&self) -> bool;

    async fn verify_bearer(&self, token: &str) -> bool;
}
