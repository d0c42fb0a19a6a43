//! In-process storage backed by `object_store`'s `InMemory` store.
//!
//! Multipart uploads are staged in a side table and only written to the store on
//! completion, so partially uploaded objects are never visible.

use crate::keys::validate_key;
use crate::multipart::{part_etag, validate_completion};
use crate::range::check_range;
use crate::signing::UrlSigner;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;
use vidlift_core::constants::DEFAULT_CONTENT_TYPE;
use vidlift_core::models::{CompletedPart, ObjectEntry, SignedMethod};

struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, (Bytes, String)>,
}

/// In-memory storage implementation
#[derive(Clone)]
pub struct MemoryStorage {
    store: Arc<InMemory>,
    uploads: Arc<Mutex<HashMap<String, PendingUpload>>>,
    signer: UrlSigner,
}

impl MemoryStorage {
    pub fn new(signer: UrlSigner) -> Self {
        MemoryStorage {
            store: Arc::new(InMemory::new()),
            uploads: Arc::new(Mutex::new(HashMap::new())),
            signer,
        }
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Path::parse(key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }

    fn map_read_error(key: &str, err: ObjectStoreError) -> StorageError {
        match err {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        }
    }

    /// Number of multipart uploads still open.
    pub async fn pending_uploads(&self) -> usize {
        self.uploads.lock().await.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put_object(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.store
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "Memory storage upload failed");
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Memory storage upload successful"
        );

        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::map_read_error(key, e))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn get_object_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        let data = self.get_object(key).await?;
        check_range(key, &range, data.len() as u64)?;
        Ok(data.slice(range.start as usize..range.end as usize))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| Self::map_read_error(key, e))?;
        Ok(meta.size)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let location = Self::location(key)?;
        self.store
            .delete(&location)
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        tracing::info!(key = %key, "Memory storage delete successful");
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let metas: Vec<_> = self
            .store
            .list(None)
            .try_collect()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let mut objects: Vec<ObjectEntry> = metas
            .into_iter()
            .map(|meta| ObjectEntry {
                name: meta.location.to_string(),
                size: meta.size,
                source: StorageBackend::Memory,
            })
            .filter(|entry| entry.name.starts_with(prefix))
            .collect();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn presign(
        &self,
        method: SignedMethod,
        key: &str,
        expires_in: Duration,
        extra: &[(&str, String)],
    ) -> StorageResult<String> {
        Self::location(key)?;
        Ok(self.signer.sign(method, key, expires_in, extra))
    }

    async fn initiate_multipart(&self, key: &str, _content_type: &str) -> StorageResult<String> {
        Self::location(key)?;
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.lock().await.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        index: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        let etag = part_etag(&data);
        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| {
                StorageError::MultipartFailed(format!("Unknown upload id {} for {}", upload_id, key))
            })?;
        upload.parts.insert(index, (data, etag.clone()));
        Ok(CompletedPart { index, etag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<u64> {
        let assembled = {
            let uploads = self.uploads.lock().await;
            let upload = uploads
                .get(upload_id)
                .filter(|upload| upload.key == key)
                .ok_or_else(|| {
                    StorageError::MultipartFailed(format!(
                        "Unknown upload id {} for {}",
                        upload_id, key
                    ))
                })?;

            let tokens: Vec<(u32, String)> = upload
                .parts
                .iter()
                .map(|(index, (_, etag))| (*index, etag.clone()))
                .collect();
            validate_completion(upload_id, &tokens, parts)?;

            let total: usize = upload.parts.values().map(|(data, _)| data.len()).sum();
            let mut buffer = BytesMut::with_capacity(total);
            for (data, _) in upload.parts.values() {
                buffer.extend_from_slice(data);
            }
            buffer.freeze()
        };

        let size = assembled.len() as u64;
        self.put_object(key, assembled, DEFAULT_CONTENT_TYPE).await?;
        self.uploads.lock().await.remove(upload_id);
        Ok(size)
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        self.uploads.lock().await.remove(upload_id);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(UrlSigner::new(
            b"memory-test-secret-memory-test-sec",
            "http://localhost:4000/api/v0",
        ))
    }

    #[tokio::test]
    async fn listing_filters_by_plain_prefix() {
        let storage = storage();
        for key in ["video-a.mp4", "video-b.mp4", "audio.mp3"] {
            storage
                .put_object(key, Bytes::from_static(b"xyz"), "video/mp4")
                .await
                .unwrap();
        }
        let listed = storage.list_objects("video").await.unwrap();
        let names: Vec<_> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["video-a.mp4", "video-b.mp4"]);
        assert!(listed.iter().all(|o| o.source == StorageBackend::Memory));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let storage = storage();
        assert!(storage.get_object("nope").await.unwrap_err().is_not_found());
        assert!(storage.content_length("nope").await.unwrap_err().is_not_found());
        assert!(storage.delete_object("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn multipart_is_invisible_until_completed() {
        let storage = storage();
        let upload_id = storage.initiate_multipart("clip.mp4", "video/mp4").await.unwrap();
        let p1 = storage
            .upload_part("clip.mp4", &upload_id, 1, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let p0 = storage
            .upload_part("clip.mp4", &upload_id, 0, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        assert!(storage.list_objects("").await.unwrap().is_empty());

        storage
            .complete_multipart("clip.mp4", &upload_id, &[p0, p1])
            .await
            .unwrap();
        assert_eq!(
            storage.get_object("clip.mp4").await.unwrap(),
            Bytes::from_static(b"hello world")
        );
        assert_eq!(storage.pending_uploads().await, 0);
    }

    #[tokio::test]
    async fn part_upload_for_wrong_key_is_rejected() {
        let storage = storage();
        let upload_id = storage.initiate_multipart("a.mp4", "video/mp4").await.unwrap();
        assert!(matches!(
            storage
                .upload_part("b.mp4", &upload_id, 0, Bytes::from_static(b"x"))
                .await,
            Err(StorageError::MultipartFailed(_))
        ));
        storage.abort_multipart("a.mp4", &upload_id).await.unwrap();
        assert_eq!(storage.pending_uploads().await, 0);
    }

    #[tokio::test]
    async fn range_read_checks_bounds() {
        let storage = storage();
        storage
            .put_object("r.bin", Bytes::from_static(b"abcdef"), "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(
            storage.get_object_range("r.bin", 2..4).await.unwrap(),
            Bytes::from_static(b"cd")
        );
        assert!(matches!(
            storage.get_object_range("r.bin", 4..9).await,
            Err(StorageError::RangeUnsatisfiable { .. })
        ));
    }
}
