use super::error::IngestError;
use super::retry::with_retry;
use crate::config::PipelineConfig;
use crate::domain::jobs::{upload_jobs, UploadJob};
use crate::domain::keys::AssetKeys;
use crate::domain::product::{MediaType, Product};
use crate::ports::repository::{ProductRepository, RepositoryError};
use crate::ports::storage::{ObjectStorage, StorageError};
use std::path::Path;
use tracing::{debug, info, warn};

/// Uploads an original/watermarked pair and records it on the owning product.
pub struct AssetPublisher<S, R> {
    storage: S,
    repo: R,
    config: PipelineConfig,
}

impl<S, R> AssetPublisher<S, R>
where
    S: ObjectStorage,
    R: ProductRepository,
{
    pub fn new(storage: S, repo: R, config: &PipelineConfig) -> Self {
        Self {
            storage,
            repo,
            config: config.clone(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Upload both files, then attach them to the product.
    ///
    /// Nothing is written to the product unless both uploads landed. The
    /// extension of `original` decides the extension of both object keys.
    pub async fn publish(
        &self,
        uuid: &str,
        media_type: &str,
        original: &Path,
        watermarked: &Path,
    ) -> Result<Product, IngestError> {
        let keys = check_request(uuid, media_type, original)?;
        let jobs = upload_jobs(original, watermarked, &keys);

        self.upload(&keys, &jobs).await?;

        match self.attach(&keys).await {
            Ok(product) => {
                info!(
                    uuid,
                    revision = product.revision,
                    public_key = ?product.public_key,
                    "Product updated"
                );
                Ok(product)
            }
            Err(e) => {
                self.compensate(&keys, &jobs).await;
                Err(e)
            }
        }
    }

    /// Both uploads run concurrently. If one fails the other is rolled back,
    /// unless the stored product already references it.
    pub async fn upload(&self, keys: &AssetKeys, jobs: &[UploadJob; 2]) -> Result<(), IngestError> {
        let [original, watermarked] = jobs;
        let (first, second) = futures::join!(
            self.upload_one(original),
            self.upload_one(watermarked)
        );

        match (first, second) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => {
                self.compensate(keys, std::slice::from_ref(watermarked)).await;
                Err(IngestError::upload(original.file, e))
            }
            (Ok(()), Err(e)) => {
                self.compensate(keys, std::slice::from_ref(original)).await;
                Err(IngestError::upload(watermarked.file, e))
            }
            (Err(e), Err(_)) => Err(IngestError::upload(original.file, e)),
        }
    }

    async fn upload_one(&self, job: &UploadJob) -> Result<(), StorageError> {
        with_retry(
            &self.config.upload_retry,
            "upload",
            // a missing source file will still be missing next time
            |e: &StorageError| !matches!(e, StorageError::Source { .. } | StorageError::InvalidKey(_)),
            || self.storage.upload(job),
        )
        .await?;
        debug!(key = %job.key(), file = %job.file, "Uploaded");
        Ok(())
    }

    /// Locate the product, apply the new asset and save it.
    ///
    /// A revision conflict means someone else saved in between; the product
    /// is reloaded and the mutation reapplied on top of their version.
    pub async fn attach(&self, keys: &AssetKeys) -> Result<Product, IngestError> {
        let uuid = keys.uuid();
        let mut conflicts = 0;

        loop {
            let mut product = self
                .find(uuid)
                .await?
                .ok_or_else(|| IngestError::ProductNotFound(uuid.to_string()))?;

            if product.media_type != MediaType::Audio {
                return Err(IngestError::Validation(format!(
                    "product {} is {}, not audio",
                    uuid, product.media_type
                )));
            }

            product.attach_asset(keys, self.config.variant_policy);

            match self.save(&product).await {
                Ok(saved) => return Ok(saved),
                Err(RepositoryError::Conflict { .. }) if conflicts < self.config.conflict_retries => {
                    conflicts += 1;
                    warn!(uuid, conflicts, "Product changed concurrently, reapplying");
                }
                Err(RepositoryError::Conflict { .. }) => {
                    return Err(IngestError::Conflict(uuid.to_string()))
                }
                Err(e) => return Err(IngestError::Persistence(e)),
            }
        }
    }

    async fn find(&self, uuid: &str) -> Result<Option<Product>, IngestError> {
        with_retry(
            &self.config.persist_retry,
            "find product",
            is_transient,
            || self.repo.find_by_uuid(uuid),
        )
        .await
        .map_err(IngestError::Persistence)
    }

    async fn save(&self, product: &Product) -> Result<Product, RepositoryError> {
        with_retry(
            &self.config.persist_retry,
            "save product",
            is_transient,
            || self.repo.save(product),
        )
        .await
    }

    /// Delete uploaded objects that no stored product state points at.
    ///
    /// Keys are deterministic, so a replay overwrites objects an earlier
    /// successful run already recorded; those must survive.
    async fn compensate(&self, keys: &AssetKeys, jobs: &[UploadJob]) {
        if !self.config.compensate_orphans {
            warn!(uuid = keys.uuid(), "Leaving uploaded objects in place");
            return;
        }

        let referenced: Vec<String> = match self.repo.find_by_uuid(keys.uuid()).await {
            Ok(Some(product)) => product
                .referenced_keys()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(uuid = keys.uuid(), error = %e, "Cannot tell which objects are orphaned, keeping them");
                return;
            }
        };

        let orphans: Vec<UploadJob> = jobs
            .iter()
            .filter(|job| !referenced.contains(&job.filename))
            .cloned()
            .collect();
        self.rollback(&orphans).await;
    }

    async fn rollback(&self, jobs: &[UploadJob]) {
        if !self.config.compensate_orphans {
            return;
        }
        for job in jobs {
            let key = job.key();
            match self.storage.delete(&key).await {
                Ok(()) => info!(key = %key, "Removed orphaned object"),
                Err(e) => warn!(key = %key, error = %e, "Failed to remove orphaned object"),
            }
        }
    }
}

fn is_transient(e: &RepositoryError) -> bool {
    matches!(e, RepositoryError::Backend(_))
}

/// Everything that can be rejected before touching storage.
pub fn check_request(uuid: &str, media_type: &str, original: &Path) -> Result<AssetKeys, IngestError> {
    let media_type: MediaType = media_type.parse().map_err(IngestError::Validation)?;
    if media_type != MediaType::Audio {
        return Err(IngestError::Validation("Wrong mediaType".to_string()));
    }
    let file_name = original
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IngestError::Validation("Can not get file".to_string()))?;
    Ok(AssetKeys::from_file_name(uuid, file_name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryProductRepository, MemoryStorage};
    use crate::config::RetryPolicy;
    use crate::domain::product::VariantPolicy;
    use crate::ports::repository::MockProductRepository;
    use crate::ports::storage::MockObjectStorage;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn config() -> PipelineConfig {
        PipelineConfig {
            upload_retry: RetryPolicy::new(3, Duration::from_millis(1)),
            persist_retry: RetryPolicy::new(3, Duration::from_millis(1)),
            ..PipelineConfig::default()
        }
    }

    fn staged(dir: &TempDir) -> (PathBuf, PathBuf) {
        let original = dir.path().join("song.mp3");
        let watermarked = dir.path().join("song-watermarked.mp3");
        std::fs::write(&original, b"original").unwrap();
        std::fs::write(&watermarked, b"watermarked").unwrap();
        (original, watermarked)
    }

    fn seeded_repo(uuid: &str) -> MemoryProductRepository {
        let repo = MemoryProductRepository::new();
        repo.insert(Product::new(uuid, MediaType::Audio));
        repo
    }

    #[tokio::test]
    async fn publishes_song_mp3_under_uuid_keys() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        let repo = seeded_repo("abc123");
        let publisher = AssetPublisher::new(storage.clone(), repo.clone(), &config());

        let product = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();

        assert_eq!(
            storage.keys(),
            vec![
                "abc123/audio/abc123-original.mp3".to_string(),
                "abc123/audio/abc123-watermarked.mp3".to_string(),
            ]
        );
        assert_eq!(
            storage.get("abc123/audio/abc123-watermarked.mp3").unwrap().bytes,
            b"watermarked"
        );
        assert_eq!(product.public_key.as_deref(), Some("abc123-watermarked.mp3"));
        assert_eq!(product.thumbnail_key.as_deref(), Some("abc123-watermarked.mp3"));
        assert_eq!(product.variants.last().unwrap().key, "abc123-original.mp3");
        assert_eq!(repo.get("abc123").unwrap(), product);
    }

    #[tokio::test]
    async fn wrong_media_type_does_no_io() {
        let mut storage = MockObjectStorage::new();
        storage.expect_upload().never();
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_uuid().never();
        repo.expect_save().never();
        let publisher = AssetPublisher::new(storage, repo, &config());

        let err = publisher
            .publish("abc123", "video", Path::new("a.mp4"), Path::new("b.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Validation(m) if m == "Wrong mediaType"));
    }

    #[tokio::test]
    async fn unknown_product_leaves_collection_unchanged() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        let repo = seeded_repo("someone-else");
        let before = repo.get("someone-else");
        let publisher = AssetPublisher::new(storage.clone(), repo.clone(), &config());

        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::ProductNotFound(uuid) if uuid == "abc123"));
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("someone-else"), before);
        // orphans were swept
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn unknown_product_keeps_orphans_when_compensation_is_off() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        let config = PipelineConfig {
            compensate_orphans: false,
            ..config()
        };
        let publisher = AssetPublisher::new(storage.clone(), MemoryProductRepository::new(), &config);

        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::ProductNotFound(_)));
        assert_eq!(storage.keys().len(), 2);
    }

    #[tokio::test]
    async fn failed_upload_names_the_file_and_rolls_back_the_other() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        storage.fail_uploads_of("abc123-watermarked.mp3");
        let repo = seeded_repo("abc123");
        let publisher = AssetPublisher::new(storage.clone(), repo.clone(), &config());

        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Upload {
                file: crate::domain::jobs::AssetFile::Watermarked,
                ..
            }
        ));
        assert!(storage.keys().is_empty());
        assert_eq!(repo.get("abc123").unwrap().revision, 0);
    }

    #[tokio::test]
    async fn failed_replay_keeps_objects_the_product_references() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        let repo = seeded_repo("abc123");
        let publisher = AssetPublisher::new(storage.clone(), repo.clone(), &config());
        publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();

        storage.fail_uploads_of("abc123-watermarked.mp3");
        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Upload {
                file: crate::domain::jobs::AssetFile::Watermarked,
                ..
            }
        ));
        let product = repo.get("abc123").unwrap();
        for key in product.referenced_keys() {
            assert!(
                storage.get(&format!("abc123/audio/{}", key)).is_some(),
                "{} missing from storage",
                key
            );
        }
        assert!(storage.get("abc123/audio/abc123-original.mp3").is_some());
    }

    #[tokio::test]
    async fn transient_upload_errors_are_retried() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let mut storage = MockObjectStorage::new();
        let mut failures = 2;
        storage
            .expect_upload()
            .withf(|job| job.filename == "abc123-original.mp3")
            .times(3)
            .returning(move |job| {
                if failures > 0 {
                    failures -= 1;
                    Err(StorageError::Backend {
                        key: job.key(),
                        message: "503 SlowDown".into(),
                    })
                } else {
                    Ok(())
                }
            });
        storage
            .expect_upload()
            .withf(|job| job.filename == "abc123-watermarked.mp3")
            .times(1)
            .returning(|_| Ok(()));
        let publisher = AssetPublisher::new(storage, seeded_repo("abc123"), &config());

        let product = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();
        assert_eq!(product.revision, 1);
    }

    #[tokio::test]
    async fn missing_source_is_not_retried() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("song.mp3");
        std::fs::write(&original, b"original").unwrap();
        let storage = MemoryStorage::new();
        let publisher = AssetPublisher::new(storage.clone(), seeded_repo("abc123"), &config());

        let err = publisher
            .publish("abc123", "audio", &original, &dir.path().join("never-written.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Upload {
                source: StorageError::Source { .. },
                ..
            }
        ));
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn upsert_replay_keeps_one_variant() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let repo = seeded_repo("abc123");
        let publisher = AssetPublisher::new(MemoryStorage::new(), repo.clone(), &config());

        publisher.publish("abc123", "audio", &original, &watermarked).await.unwrap();
        let product = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();

        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.revision, 2);
    }

    #[tokio::test]
    async fn append_replay_duplicates_variant() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let config = PipelineConfig {
            variant_policy: VariantPolicy::Append,
            ..config()
        };
        let publisher = AssetPublisher::new(MemoryStorage::new(), seeded_repo("abc123"), &config);

        publisher.publish("abc123", "audio", &original, &watermarked).await.unwrap();
        let product = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();

        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.variants[0].key, "abc123-original.mp3");
        assert_eq!(product.variants[1].key, "abc123-original.mp3");
    }

    #[tokio::test]
    async fn conflict_reloads_and_reapplies() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let mut repo = MockProductRepository::new();
        let mut loads = 0;
        repo.expect_find_by_uuid().times(2).returning(move |uuid| {
            loads += 1;
            let mut product = Product::new(uuid, MediaType::Audio);
            product.revision = loads;
            Ok(Some(product))
        });
        repo.expect_save()
            .withf(|p| p.revision == 1)
            .times(1)
            .returning(|p| {
                Err(RepositoryError::Conflict {
                    uuid: p.uuid.clone(),
                    expected: p.revision,
                })
            });
        repo.expect_save()
            .withf(|p| p.revision == 2)
            .times(1)
            .returning(|p| {
                let mut saved = p.clone();
                saved.revision += 1;
                Ok(saved)
            });
        let publisher = AssetPublisher::new(MemoryStorage::new(), repo, &config());

        let product = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap();
        assert_eq!(product.revision, 3);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_previously_referenced_objects() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let storage = MemoryStorage::new();
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_uuid().returning(|uuid| {
            // an earlier run already published this pair
            let mut product = Product::new(uuid, MediaType::Audio);
            product.attach_asset(
                &AssetKeys::new(uuid, "mp3").unwrap(),
                VariantPolicy::Upsert,
            );
            Ok(Some(product))
        });
        repo.expect_save()
            .times(3)
            .returning(|_| Err(RepositoryError::Backend("connection reset".into())));
        let publisher = AssetPublisher::new(storage.clone(), repo, &config());

        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Persistence(_)));
        assert_eq!(storage.keys().len(), 2);
    }

    #[tokio::test]
    async fn product_of_another_media_type_is_rejected() {
        let dir = tempdir().unwrap();
        let (original, watermarked) = staged(&dir);
        let repo = MemoryProductRepository::new();
        repo.insert(Product::new("abc123", MediaType::Image));
        let publisher = AssetPublisher::new(MemoryStorage::new(), repo.clone(), &config());

        let err = publisher
            .publish("abc123", "audio", &original, &watermarked)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Validation(_)));
        assert!(repo.get("abc123").unwrap().variants.is_empty());
    }

    #[test]
    fn request_checks() {
        assert!(check_request("abc123", "audio", Path::new("/s/original.mp3")).is_ok());
        assert!(matches!(
            check_request("abc123", "podcast", Path::new("/s/original.mp3")),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            check_request("../x", "audio", Path::new("/s/original.mp3")),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            check_request("abc123", "audio", Path::new("/s/original")),
            Err(IngestError::Validation(_))
        ));
    }
}
