//! # np-store-json
//!
//! File-backed implementation of `RecordRepo`.
//!
//! Each store owns one JSON document holding the whole collection as a
//! pretty-printed array. Every mutation is a read-modify-write of the full
//! document, serialized by a per-store async mutex so concurrent requests
//! cannot lose each other's updates. The document is replaced through a
//! temporary sibling and a rename, so readers never observe a partial write.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use np_core::error::{AppError, Result};
use np_core::models::RecordId;
use np_core::traits::{AssetChange, Record, RecordRepo, Updated};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub struct JsonFileStore<R> {
    path: PathBuf,
    /// Held for the duration of every read-modify-write cycle.
    write_lock: Mutex<()>,
    /// Last millisecond timestamp handed out by `next_id`.
    last_id: AtomicI64,
    _records: PhantomData<fn() -> R>,
}

impl<R: Record> JsonFileStore<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            last_id: AtomicI64::new(0),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the document. A missing file is an empty collection.
    async fn load(&self) -> Result<Vec<R>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| AppError::CorruptStore {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn persist(&self, records: &[R]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.path, &json).await?;
        debug!(path = %self.path.display(), records = records.len(), "persisted {} store", R::KIND);
        Ok(())
    }

    /// Loads the collection under the write lock, applies `change`, and
    /// writes the result back. Nothing is written if `change` fails.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<R>) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let outcome = change(&mut records)?;
        self.persist(&records).await?;
        Ok(outcome)
    }
}

/// Writes `bytes` to a temporary file next to `path`, syncs it, then renames
/// it over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("store");
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    written
}

#[async_trait]
impl<R: Record> RecordRepo<R> for JsonFileStore<R> {
    async fn ensure_initialized(&self) -> Result<()> {
        if fs::try_exists(&self.path).await? {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        // Another request may have created it while we waited.
        if fs::try_exists(&self.path).await? {
            return Ok(());
        }
        let seed = R::seed();
        self.persist(&seed).await?;
        info!(path = %self.path.display(), records = seed.len(), "initialized {} store", R::KIND);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<R>> {
        self.load().await
    }

    async fn write_all(&self, records: &[R]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(records).await
    }

    fn next_id(&self) -> RecordId {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_id.load(Ordering::Acquire);
        loop {
            let candidate = now.max(last + 1);
            match self.last_id.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return RecordId::from_millis(candidate),
                Err(actual) => last = actual,
            }
        }
    }

    async fn insert(&self, record: R) -> Result<R> {
        self.mutate(move |records| {
            if records.iter().any(|r| r.id() == record.id()) {
                return Err(AppError::Conflict(format!(
                    "{} with ID {} already exists",
                    R::KIND,
                    record.id()
                )));
            }
            records.push(record.clone());
            Ok(record)
        })
        .await
    }

    async fn update(&self, id: &RecordId, update: R::Update, asset: AssetChange) -> Result<Updated<R>> {
        let now = Utc::now();
        self.mutate(move |records| {
            let entry = records
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or_else(|| AppError::not_found(R::KIND, id))?;
            let previous = entry.clone();
            entry.apply(update, now);
            if let AssetChange::Replace(reference) = asset {
                entry.set_asset(Some(reference));
            }
            Ok(Updated {
                previous,
                current: entry.clone(),
            })
        })
        .await
    }

    async fn remove(&self, id: &RecordId) -> Result<R> {
        self.mutate(move |records| {
            let index = records
                .iter()
                .position(|r| r.id() == id)
                .ok_or_else(|| AppError::not_found(R::KIND, id))?;
            Ok(records.remove(index))
        })
        .await
    }
}
