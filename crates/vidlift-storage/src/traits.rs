//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use vidlift_core::models::{CompletedPart, ObjectEntry, SignedMethod};
use vidlift_core::TransferError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Range {start}..{end} of {key} is unsatisfiable (object size {size})")]
    RangeUnsatisfiable {
        key: String,
        start: u64,
        end: u64,
        size: u64,
    },

    #[error("Multipart upload failed: {0}")]
    MultipartFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid signed URL: {0}")]
    SignatureInvalid(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => TransferError::NotFound(key),
            StorageError::InvalidKey(msg) | StorageError::InvalidRequest(msg) => {
                TransferError::InvalidArgument(msg)
            }
            StorageError::RangeUnsatisfiable {
                key,
                start,
                end,
                size,
            } => TransferError::RangeUnsatisfiable {
                name: key,
                start,
                end,
                available: size,
            },
            StorageError::SignatureInvalid(msg) => TransferError::SignatureInvalid(msg),
            StorageError::ConfigError(msg) => TransferError::Internal(msg),
            other => TransferError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Every backend (S3, local filesystem, in-memory) implements this trait so the
/// coordinator never couples to a specific provider. Objects become visible only once a
/// write (single-shot or multipart completion) has fully succeeded.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write a whole object, replacing any existing object under `key`.
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Write an object from a reader. Returns the number of bytes written.
    ///
    /// The default implementation buffers the reader; backends that can stream override it.
    async fn put_object_stream(
        &self,
        key: &str,
        content_type: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<u64> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        let size = buffer.len() as u64;
        self.put_object(key, Bytes::from(buffer), content_type)
            .await?;
        Ok(size)
    }

    /// Read a whole object.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    /// Read exactly `range` (end exclusive) of an object.
    ///
    /// Fails with `RangeUnsatisfiable` when the range is inverted or runs past the end.
    async fn get_object_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes>;

    /// Size of an object in bytes.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Fails with `NotFound` when nothing is stored under `key`.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// List objects whose key starts with `prefix` (empty prefix lists everything).
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// Build a time-limited URL for `method` on `key`.
    ///
    /// `extra` carries additional signed query parameters. A PUT carrying
    /// `uploadId` and `partNumber` targets a single part of a multipart upload.
    async fn presign(
        &self,
        method: SignedMethod,
        key: &str,
        expires_in: Duration,
        extra: &[(&str, String)],
    ) -> StorageResult<String>;

    /// Start a multipart upload and return its upload id.
    async fn initiate_multipart(&self, key: &str, content_type: &str) -> StorageResult<String>;

    /// Store one part (zero-based `index`) of a multipart upload.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        index: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart>;

    /// Assemble the listed parts, in order, into the final object. Returns its size.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<u64>;

    /// Discard a multipart upload and every part stored for it.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
