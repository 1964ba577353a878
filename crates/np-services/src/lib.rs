//! # np-services
//!
//! Resource orchestration: validates payloads, keeps uploaded assets in step
//! with their records and turns store failures into the right outcome for
//! read and write paths.

pub mod pagination;

use std::sync::Arc;

use chrono::Utc;
use np_core::error::{AppError, Result};
use np_core::models::{RecordId, Upload};
use np_core::traits::{AssetChange, AssetStore, Payload, Record, RecordRepo};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use pagination::Page;

/// CRUD for one resource type, backed by one store and one asset directory.
pub struct ResourceService<R: Record> {
    repo: Arc<dyn RecordRepo<R>>,
    assets: Arc<dyn AssetStore>,
    /// Held across the id check, asset write and record write of every
    /// mutation, so an asset file is only touched by the request that
    /// commits the record owning it. Shared by clones.
    commit_lock: Arc<Mutex<()>>,
}

impl<R: Record> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            assets: Arc::clone(&self.assets),
            commit_lock: Arc::clone(&self.commit_lock),
        }
    }
}

impl<R: Record> ResourceService<R> {
    pub fn new(repo: Arc<dyn RecordRepo<R>>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            repo,
            assets,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates the backing document if it is missing.
    pub async fn initialize(&self) -> Result<()> {
        self.repo.ensure_initialized().await
    }

    /// Current collection for serving. A corrupt document is served as empty.
    async fn snapshot(&self) -> Result<Vec<R>> {
        self.repo.ensure_initialized().await?;
        match self.repo.read_all().await {
            Err(AppError::CorruptStore { path, reason }) => {
                warn!(resource = R::KIND, %path, %reason, "serving corrupt store as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn list(&self, page: Page) -> Result<Vec<R>> {
        Ok(page.apply(self.snapshot().await?))
    }

    pub async fn get(&self, id: &RecordId) -> Result<R> {
        self.snapshot()
            .await?
            .into_iter()
            .find(|record| record.id() == id)
            .ok_or_else(|| AppError::not_found(R::KIND, id))
    }

    /// Validates, stores the optional upload under the new id, then inserts.
    /// Nothing is committed when the asset cannot be written.
    pub async fn create(&self, draft: R::Draft, upload: Option<Upload>) -> Result<R> {
        draft.validate()?;
        self.repo.ensure_initialized().await?;
        let _commit = self.commit_lock.lock().await;

        let id = match draft.requested_id() {
            Some(requested) => requested.clone(),
            None => self.repo.next_id(),
        };
        if self.repo.read_all().await?.iter().any(|r| r.id() == &id) {
            return Err(AppError::Conflict(format!("{} with ID {id} already exists", R::KIND)));
        }

        let asset = match upload.filter(|u| !u.is_empty()) {
            Some(upload) => Some(self.assets.save(upload, &id).await?),
            None => None,
        };

        let mut record = R::from_draft(id.clone(), draft, Utc::now());
        if let Some(reference) = &asset {
            record.set_asset(Some(reference.clone()));
        }

        match self.repo.insert(record).await {
            Ok(created) => {
                info!(resource = R::KIND, id = %id, "created");
                Ok(created)
            }
            Err(e) => {
                // The id was free under the commit lock, so the file is ours.
                if let Some(reference) = asset {
                    self.assets.delete(&reference, &id).await;
                }
                Err(e)
            }
        }
    }

    /// Applies the update policy of `R`. A new upload is saved before the
    /// record changes; the replaced asset is removed only afterwards.
    pub async fn update(&self, id: &RecordId, update: R::Update, upload: Option<Upload>) -> Result<R> {
        update.validate()?;
        if let Some(requested) = update.requested_id() {
            if requested != id {
                return Err(AppError::validation(format!(
                    "id {requested} in body does not match {id}"
                )));
            }
        }
        self.repo.ensure_initialized().await?;
        let _commit = self.commit_lock.lock().await;

        let existing = self
            .repo
            .read_all()
            .await?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| AppError::not_found(R::KIND, id))?;

        let change = match upload.filter(|u| !u.is_empty()) {
            Some(upload) => AssetChange::Replace(self.assets.save(upload, id).await?),
            None => AssetChange::Keep,
        };

        let updated = match self.repo.update(id, update, change.clone()).await {
            Ok(updated) => updated,
            Err(e) => {
                if let AssetChange::Replace(reference) = &change {
                    if existing.asset() != Some(reference.as_str()) {
                        self.assets.delete(reference, id).await;
                    }
                }
                return Err(e);
            }
        };

        if let Some(old) = updated.previous.asset() {
            if updated.current.asset() != Some(old) {
                self.assets.delete(old, id).await;
            }
        }
        info!(resource = R::KIND, id = %id, "updated");
        Ok(updated.current)
    }

    /// Removes the record, then its owned asset (best effort).
    pub async fn delete(&self, id: &RecordId) -> Result<R> {
        self.repo.ensure_initialized().await?;
        let _commit = self.commit_lock.lock().await;
        let removed = self.repo.remove(id).await?;
        if let Some(reference) = removed.asset() {
            self.assets.delete(reference, id).await;
        }
        info!(resource = R::KIND, id = %id, "deleted");
        Ok(removed)
    }

    /// Fetchable URL of the record's image, or the placeholder.
    pub fn public_url(&self, record: &R) -> String {
        self.assets.public_url(record.asset().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::NaiveDate;
    use np_core::models::{Event, EventDraft, EventPatch, MediaEvent, MediaEventDraft, Member, MemberDraft};
    use np_core::traits::{MockAssetStore, Updated};
    use np_media_local::LocalAssetStore;
    use async_trait::async_trait;
    use np_store_json::JsonFileStore;
    use std::path::Path;
    use tempfile::TempDir;

    const BASE: &str = "http://localhost:8000";

    fn id(raw: &str) -> RecordId {
        RecordId::parse(raw).unwrap()
    }

    fn png(name: &str) -> Upload {
        Upload::new(name, Some("image/png".into()), Bytes::from_static(b"\x89PNG"))
    }

    fn launch() -> EventDraft {
        EventDraft {
            title: "Launch".into(),
            description: "x".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        }
    }

    fn events(dir: &Path) -> (ResourceService<Event>, Arc<JsonFileStore<Event>>) {
        let store = Arc::new(JsonFileStore::<Event>::new(dir.join("data/events.json")));
        let assets = LocalAssetStore::new(dir.join("public"), "events", BASE, "/event-placeholder.jpg");
        (ResourceService::new(store.clone(), Arc::new(assets)), store)
    }

    fn events_with(dir: &Path, assets: MockAssetStore) -> ResourceService<Event> {
        let store = JsonFileStore::<Event>::new(dir.join("data/events.json"));
        ResourceService::new(Arc::new(store), Arc::new(assets))
    }

    /// Event store whose inserts and updates fail after the asset is saved.
    struct FailingWrites {
        inner: JsonFileStore<Event>,
    }

    fn disk_full() -> AppError {
        AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    #[async_trait]
    impl RecordRepo<Event> for FailingWrites {
        async fn ensure_initialized(&self) -> Result<()> {
            self.inner.ensure_initialized().await
        }

        async fn read_all(&self) -> Result<Vec<Event>> {
            self.inner.read_all().await
        }

        async fn write_all(&self, records: &[Event]) -> Result<()> {
            self.inner.write_all(records).await
        }

        fn next_id(&self) -> RecordId {
            self.inner.next_id()
        }

        async fn insert(&self, _record: Event) -> Result<Event> {
            Err(disk_full())
        }

        async fn update(&self, _id: &RecordId, _update: EventPatch, _asset: AssetChange) -> Result<Updated<Event>> {
            Err(disk_full())
        }

        async fn remove(&self, id: &RecordId) -> Result<Event> {
            self.inner.remove(id).await
        }
    }

    fn members(dir: &Path) -> ResourceService<Member> {
        let store = JsonFileStore::<Member>::new(dir.join("data/members.json"));
        let assets = LocalAssetStore::new(dir.join("public"), "members", BASE, "/owner.png");
        ResourceService::new(Arc::new(store), Arc::new(assets))
    }

    #[tokio::test]
    async fn launch_scenario_round_trip() {
        let dir = TempDir::new().unwrap();
        let (service, store) = events(dir.path());

        assert!(service.list(Page::default()).await.unwrap().is_empty());

        let created = service.create(launch(), None).await.unwrap();
        assert_eq!(created.title, "Launch");
        assert!(created.is_active);
        assert_eq!(service.list(Page::default()).await.unwrap().len(), 1);
        assert_eq!(service.get(&created.id).await.unwrap(), created);

        let removed = service.delete(&created.id).await.unwrap();
        assert_eq!(removed.id, created.id);
        assert!(service.list(Page::default()).await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "[]");

        let err = service.get(&created.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn invalid_create_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let service = events_with(dir.path(), MockAssetStore::new());

        let err = service
            .create(EventDraft::default(), Some(png("a.png")))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "validation error: title, description, date are required");
        assert!(service.list(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn asset_failure_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let mut assets = MockAssetStore::new();
        assets.expect_save().times(1).returning(|_, _| {
            Err(AppError::AssetIo {
                path: "public/events/1.png".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });
        let service = events_with(dir.path(), assets);

        let err = service.create(launch(), Some(png("a.png"))).await.unwrap_err();

        assert!(matches!(err, AppError::AssetIo { .. }));
        assert!(service.list(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_ignored() {
        let dir = TempDir::new().unwrap();
        let service = events_with(dir.path(), MockAssetStore::new());

        let empty = Upload::new("", None, Bytes::new());
        let created = service.create(launch(), Some(empty)).await.unwrap();
        assert_eq!(created.image, None);
    }

    #[tokio::test]
    async fn upload_is_stored_under_the_record_id() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());

        let created = service.create(launch(), Some(png("Flyer.PNG"))).await.unwrap();

        let expected = format!("/events/{}.png", created.id);
        assert_eq!(created.image.as_deref(), Some(expected.as_str()));
        assert!(dir.path().join(format!("public{expected}")).exists());
        assert_eq!(
            service.public_url(&created),
            format!("{BASE}/static{expected}")
        );
    }

    #[tokio::test]
    async fn requested_duplicate_id_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());
        let draft = EventDraft { id: Some(id("spring-fair")), ..launch() };

        service.create(draft.clone(), None).await.unwrap();
        let err = service.create(draft, None).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(service.list(Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replacing_an_image_removes_the_old_file() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());
        let created = service.create(launch(), Some(png("a.png"))).await.unwrap();
        let old_file = dir.path().join(format!("public/events/{}.png", created.id));
        assert!(old_file.exists());

        let jpeg = Upload::new("b.jpg", Some("image/jpeg".into()), Bytes::from_static(b"jpg"));
        let patch = EventPatch { title: Some("Relaunch".into()), ..Default::default() };
        let updated = service.update(&created.id, patch, Some(jpeg)).await.unwrap();

        let new_ref = format!("/events/{}.jpg", created.id);
        assert_eq!(updated.title, "Relaunch");
        assert_eq!(updated.description, "x");
        assert_eq!(updated.image.as_deref(), Some(new_ref.as_str()));
        assert!(!old_file.exists());
        assert!(dir.path().join(format!("public{new_ref}")).exists());
    }

    #[tokio::test]
    async fn same_extension_replacement_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());
        let created = service.create(launch(), Some(png("a.png"))).await.unwrap();

        let updated = service
            .update(&created.id, EventPatch::default(), Some(png("b.png")))
            .await
            .unwrap();

        assert_eq!(updated.image, created.image);
        assert!(dir.path().join(format!("public/events/{}.png", created.id)).exists());
    }

    #[tokio::test]
    async fn update_of_unknown_id_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let service = events_with(dir.path(), MockAssetStore::new());

        let err = service
            .update(&id("404"), EventPatch::default(), Some(png("a.png")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "event not found with ID 404");
    }

    #[tokio::test]
    async fn mismatched_body_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());
        let created = service.create(launch(), None).await.unwrap();

        let patch = EventPatch { id: Some(id("other")), ..Default::default() };
        let err = service.update(&created.id, patch, None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn member_update_replaces_fields_and_spares_shared_photo() {
        let dir = TempDir::new().unwrap();
        let shared = dir.path().join("public/owner.png");
        std::fs::create_dir_all(shared.parent().unwrap()).unwrap();
        std::fs::write(&shared, b"shared").unwrap();
        let service = members(dir.path());

        let seeded = service.get(&id("1")).await.unwrap();
        assert_eq!(seeded.photo.as_deref(), Some("/owner.png"));

        let draft = MemberDraft {
            name: "Priya Yadav".into(),
            position: "Director".into(),
            bio: "New bio".into(),
            ..Default::default()
        };
        let updated = service.update(&id("1"), draft, Some(png("p.png"))).await.unwrap();

        assert_eq!(updated.position, "Director");
        assert_eq!(updated.age, None);
        assert_eq!(updated.photo.as_deref(), Some("/members/1.png"));
        assert!(shared.exists());

        // Full replace: a payload missing required fields is rejected.
        let err = service.update(&id("1"), MemberDraft::default(), None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn delete_removes_owned_asset() {
        let dir = TempDir::new().unwrap();
        let (service, _) = events(dir.path());
        let created = service.create(launch(), Some(png("a.png"))).await.unwrap();
        let file = dir.path().join(format!("public/events/{}.png", created.id));

        service.delete(&created.id).await.unwrap();

        assert!(!file.exists());
        let err = service.delete(&created.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn delete_passes_owned_reference_to_asset_store() {
        let dir = TempDir::new().unwrap();
        let mut assets = MockAssetStore::new();
        assets
            .expect_save()
            .returning(|_, owner| Ok(format!("/events/{owner}.png")));
        assets
            .expect_delete()
            .withf(|reference, owner| reference.to_string() == format!("/events/{owner}.png"))
            .times(1)
            .returning(|_, _| ());
        let service = events_with(dir.path(), assets);

        let created = service.create(launch(), Some(png("a.png"))).await.unwrap();
        service.delete(&created.id).await.unwrap();
        assert!(service.list(Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_store_reads_empty_but_blocks_writes() {
        let dir = TempDir::new().unwrap();
        let (service, store) = events(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(service.list(Page::default()).await.unwrap().is_empty());
        assert!(matches!(
            service.get(&id("1")).await.unwrap_err(),
            AppError::NotFound(..)
        ));
        assert!(matches!(
            service.create(launch(), None).await.unwrap_err(),
            AppError::CorruptStore { .. }
        ));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn list_is_paginated_in_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::<MediaEvent>::new(dir.path().join("media_events.json"));
        let assets = LocalAssetStore::new(dir.path(), "uploads", BASE, "/event-placeholder.jpg");
        let service = ResourceService::new(Arc::new(store), Arc::new(assets));

        for n in 1..=5 {
            let draft = MediaEventDraft {
                title: format!("Gallery {n}"),
                description: "photos".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, n),
                ..Default::default()
            };
            service.create(draft, None).await.unwrap();
        }

        let titles: Vec<String> = service
            .list(Page::new(1, Some(2)))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, ["Gallery 2", "Gallery 3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_id_creates_keep_the_winners_image() {
        for round in 0..20 {
            let dir = TempDir::new().unwrap();
            let (service, _) = events(dir.path());
            let draft = EventDraft { id: Some(id("dup")), ..launch() };

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let service = service.clone();
                    let draft = draft.clone();
                    tokio::spawn(async move { service.create(draft, Some(png("a.png"))).await })
                })
                .collect();

            let (mut created, mut conflicts) = (0, 0);
            for task in tasks {
                match task.await.unwrap() {
                    Ok(_) => created += 1,
                    Err(AppError::Conflict(_)) => conflicts += 1,
                    Err(e) => panic!("round {round}: {e}"),
                }
            }
            assert_eq!((created, conflicts), (1, 1), "round {round}");

            let stored = service.get(&id("dup")).await.unwrap();
            let reference = stored.image.unwrap();
            assert!(
                dir.path().join(format!("public{reference}")).exists(),
                "round {round}: {reference} is missing"
            );
        }
    }

    #[tokio::test]
    async fn failed_image_save_leaves_record_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut assets = MockAssetStore::new();
        assets.expect_save().times(1).returning(|_, _| {
            Err(AppError::AssetIo {
                path: "public/events/1.png".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });
        let service = events_with(dir.path(), assets);
        let created = service.create(launch(), None).await.unwrap();
        let document = dir.path().join("data/events.json");
        let before = std::fs::read(&document).unwrap();

        let patch = EventPatch { title: Some("Relaunch".into()), ..Default::default() };
        let err = service
            .update(&created.id, patch, Some(png("b.png")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AssetIo { .. }));
        assert_eq!(std::fs::read(&document).unwrap(), before);
        assert_eq!(service.get(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn failed_record_update_removes_the_new_image() {
        let dir = TempDir::new().unwrap();
        let inner = JsonFileStore::<Event>::new(dir.path().join("data/events.json"));
        let existing = Event::from_draft(id("7"), launch(), Utc::now());
        inner.insert(existing.clone()).await.unwrap();
        let assets = LocalAssetStore::new(dir.path().join("public"), "events", BASE, "/event-placeholder.jpg");
        let service = ResourceService::new(Arc::new(FailingWrites { inner }), Arc::new(assets));

        let err = service
            .update(&id("7"), EventPatch::default(), Some(png("b.png")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Io(_)));
        assert!(!dir.path().join("public/events/7.png").exists());
        assert_eq!(service.get(&id("7")).await.unwrap(), existing);
    }

    #[tokio::test]
    async fn failed_insert_removes_the_new_image() {
        let dir = TempDir::new().unwrap();
        let inner = JsonFileStore::<Event>::new(dir.path().join("data/events.json"));
        let assets = LocalAssetStore::new(dir.path().join("public"), "events", BASE, "/event-placeholder.jpg");
        let service = ResourceService::new(Arc::new(FailingWrites { inner }), Arc::new(assets));

        let draft = EventDraft { id: Some(id("fresh")), ..launch() };
        let err = service.create(draft, Some(png("a.png"))).await.unwrap_err();

        assert!(matches!(err, AppError::Io(_)));
        assert!(!dir.path().join("public/events/fresh.png").exists());
        assert!(service.list(Page::default()).await.unwrap().is_empty());
    }
}
