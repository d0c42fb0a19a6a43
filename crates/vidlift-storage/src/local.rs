use crate::keys::validate_key;
use crate::multipart::{part_etag, validate_completion};
use crate::range::check_range;
use crate::signing::UrlSigner;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{ErrorKind, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;
use vidlift_core::models::{CompletedPart, ObjectEntry, SignedMethod};

/// Multipart uploads in progress: `.multipart/{upload_id}/{index:05}.part`
const MULTIPART_DIR: &str = ".multipart";
/// Partially written objects, renamed into place once complete
const TMP_DIR: &str = ".tmp";
const UPLOAD_KEY_FILE: &str = "key";

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g., "/var/lib/vidlift/objects")
    /// * `signer` - Signs URLs served by the coordinator's `/signed` endpoint
    pub async fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> StorageResult<Self> {
        let base_path = base_path.into();

        for dir in [
            base_path.clone(),
            base_path.join(TMP_DIR),
            base_path.join(MULTIPART_DIR),
        ] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(LocalStorage { base_path, signer })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Keys may not escape the base directory or address the internal
    /// staging directories.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;

        let first = key.split('/').next().unwrap_or_default();
        if first == MULTIPART_DIR || first == TMP_DIR {
            return Err(StorageError::InvalidKey(format!(
                "Storage key uses a reserved prefix: {}",
                key
            )));
        }

        Ok(self.base_path.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join(TMP_DIR).join(Uuid::new_v4().to_string())
    }

    fn upload_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        let id = Uuid::parse_str(upload_id).map_err(|_| {
            StorageError::MultipartFailed(format!("Unknown upload id: {}", upload_id))
        })?;
        Ok(self.base_path.join(MULTIPART_DIR).join(id.to_string()))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Move a fully written temp file to its final location.
    async fn commit(&self, temp: &Path, dest: &Path) -> StorageResult<()> {
        self.ensure_parent_dir(dest).await?;
        if let Err(e) = fs::rename(temp, dest).await {
            let _ = fs::remove_file(temp).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to move object into {}: {}",
                dest.display(),
                e
            )));
        }
        Ok(())
    }

    /// Resolve an upload directory and check it belongs to `key`.
    async fn open_upload(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let dir = self.upload_dir(upload_id)?;
        let owner = match fs::read_to_string(dir.join(UPLOAD_KEY_FILE)).await {
            Ok(owner) => owner,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::MultipartFailed(format!(
                    "Unknown upload id: {}",
                    upload_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if owner != key {
            return Err(StorageError::MultipartFailed(format!(
                "Upload {} belongs to {}, not {}",
                upload_id, owner, key
            )));
        }
        Ok(dir)
    }

    /// Stored parts of an upload as `(index, etag, path)`, ascending by index.
    async fn uploaded_parts(&self, dir: &Path) -> StorageResult<Vec<(u32, String, PathBuf)>> {
        let mut parts = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(index) = name
                .strip_suffix(".part")
                .and_then(|stem| stem.parse::<u32>().ok())
            else {
                continue;
            };
            let etag = fs::read_to_string(dir.join(format!("{:05}.etag", index))).await?;
            parts.push((index, etag, entry.path()));
        }
        parts.sort_by_key(|(index, _, _)| *index);
        Ok(parts)
    }

    fn read_error(key: &str, path: &Path, e: std::io::Error) -> StorageError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put_object(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let temp = self.temp_path();
        let size = data.len();
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&temp).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", temp.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", temp.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", temp.display(), e))
        })?;

        self.commit(&temp, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(())
    }

    async fn put_object_stream(
        &self,
        key: &str,
        _content_type: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let temp = self.temp_path();
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&temp).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", temp.display(), e))
        })?;

        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&temp).await;
                return Err(StorageError::UploadFailed(format!(
                    "Failed to stream into {}: {}",
                    temp.display(),
                    e
                )));
            }
        };

        file.sync_all().await?;
        self.commit(&temp, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage stream upload successful"
        );

        Ok(written)
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let data = fs::read(&path)
            .await
            .map_err(|e| Self::read_error(key, &path, e))?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn get_object_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| Self::read_error(key, &path, e))?;
        let size = file.metadata().await?.len();
        check_range(key, &range, size)?;

        let len = (range.end - range.start) as usize;
        let mut buffer = vec![0u8; len];
        if len > 0 {
            file.seek(SeekFrom::Start(range.start)).await?;
            file.read_exact(&mut buffer).await.map_err(|e| {
                StorageError::DownloadFailed(format!(
                    "Failed to read range of {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        tracing::debug!(
            key = %key,
            range_start = range.start,
            range_end = range.end,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage range read successful"
        );

        Ok(Bytes::from(buffer))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::read_error(key, &path, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(metadata.len())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let mut objects = Vec::new();
        let mut pending = vec![(self.base_path.clone(), String::new())];

        while let Some((dir, relative)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if relative.is_empty() && (name == MULTIPART_DIR || name == TMP_DIR) {
                    continue;
                }
                let key = if relative.is_empty() {
                    name
                } else {
                    format!("{}/{}", relative, name)
                };

                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push((entry.path(), key));
                } else if key.starts_with(prefix) {
                    objects.push(ObjectEntry {
                        name: key,
                        size: metadata.len(),
                        source: StorageBackend::Local,
                    });
                }
            }
        }

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
        self.key_to_path(key)?;
        Ok(self.signer.sign(method, key, expires_in, extra))
    }

    async fn initiate_multipart(&self, key: &str, _content_type: &str) -> StorageResult<String> {
        self.key_to_path(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id)?;

        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(UPLOAD_KEY_FILE), key.as_bytes()).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart upload initiated");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        index: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        let dir = self.open_upload(key, upload_id).await?;
        let etag = part_etag(&data);
        let temp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

        fs::write(&temp, &data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write part {} of {}: {}", index, key, e))
        })?;
        fs::write(dir.join(format!("{:05}.etag", index)), etag.as_bytes()).await?;
        fs::rename(&temp, dir.join(format!("{:05}.part", index))).await?;

        tracing::debug!(
            key = %key,
            upload_id = %upload_id,
            index = index,
            size_bytes = data.len(),
            "Local multipart part stored"
        );

        Ok(CompletedPart { index, etag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let dir = self.open_upload(key, upload_id).await?;
        let start = std::time::Instant::now();

        let uploaded = self.uploaded_parts(&dir).await?;
        let tokens: Vec<(u32, String)> = uploaded
            .iter()
            .map(|(index, etag, _)| (*index, etag.clone()))
            .collect();
        validate_completion(upload_id, &tokens, parts)?;

        let temp = self.temp_path();
        let mut output = fs::File::create(&temp).await?;
        let mut total = 0u64;
        for (_, _, part_path) in &uploaded {
            let mut part = fs::File::open(part_path).await?;
            total += tokio::io::copy(&mut part, &mut output).await?;
        }
        output.sync_all().await?;
        self.commit(&temp, &path).await?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(error = %e, upload_id = %upload_id, "Failed to clean up multipart parts");
        }

        tracing::info!(
            key = %key,
            upload_id = %upload_id,
            parts = parts.len(),
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart upload completed"
        );

        Ok(total)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let dir = self.upload_dir(upload_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(key = %key, upload_id = %upload_id, "Local multipart upload aborted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
