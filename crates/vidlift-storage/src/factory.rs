#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-memory")]
use crate::MemoryStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult, UrlSigner};
use std::sync::Arc;
use vidlift_core::constants::API_PREFIX;
use vidlift_core::Config;

/// The primary backend plus the mirrors that may hold copies of its objects.
#[derive(Clone)]
pub struct StorageSet {
    pub primary: Arc<dyn Storage>,
    pub mirrors: Vec<Arc<dyn Storage>>,
    pub signer: UrlSigner,
}

impl StorageSet {
    /// Primary first, then mirrors in configuration order.
    pub fn all(&self) -> Vec<Arc<dyn Storage>> {
        let mut all = Vec::with_capacity(1 + self.mirrors.len());
        all.push(self.primary.clone());
        all.extend(self.mirrors.iter().cloned());
        all
    }
}

/// Signer for coordinator-served signed URLs.
///
/// Without `URL_SIGNING_SECRET` a random per-process secret is used, so URLs stop
/// verifying after a restart.
pub fn url_signer(config: &Config) -> UrlSigner {
    let base_url = format!(
        "{}{}",
        config.public_base_url().trim_end_matches('/'),
        API_PREFIX
    );
    match config.url_signing_secret() {
        Some(secret) => UrlSigner::new(secret, base_url),
        None => {
            tracing::warn!("URL_SIGNING_SECRET not set, using an ephemeral signing secret");
            let secret = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
            UrlSigner::new(secret, base_url)
        }
    }
}

/// Create one storage backend from configuration
pub async fn create_backend(
    config: &Config,
    backend: StorageBackend,
    signer: &UrlSigner,
) -> StorageResult<Arc<dyn Storage>> {
    match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region()
                .map(String::from)
                .or_else(|| config.aws_region().map(String::from))
                .ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;
            let endpoint = config.s3_endpoint().map(String::from);

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path, signer.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new(signer.clone()))),

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(StorageError::ConfigError(
            "Memory storage backend not available (storage-memory feature not enabled)"
                .to_string(),
        )),
    }
}

/// Create the primary backend and every configured mirror
pub async fn create_storage_set(config: &Config) -> StorageResult<StorageSet> {
    let signer = url_signer(config);
    let primary = create_backend(config, config.storage_backend(), &signer).await?;

    let mut mirrors = Vec::with_capacity(config.mirror_backends().len());
    for backend in config.mirror_backends() {
        mirrors.push(create_backend(config, *backend, &signer).await?);
    }

    tracing::info!(
        primary = %config.storage_backend(),
        mirrors = mirrors.len(),
        "Storage backends initialized"
    );

    Ok(StorageSet {
        primary,
        mirrors,
        signer,
    })
}
