//! Server-side session interface.
//!
//! The [`Coordinator`] owns the session table and the storage backends. Proxied clients
//! hand it part payloads; direct clients ask it for signed part URLs and acknowledge the
//! completion tokens they get back. Finalize is never best effort: an object is written
//! only when every part is present.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use uuid::Uuid;
use vidlift_core::constants::{DEFAULT_CONTENT_TYPE, STAGING_PREFIX};
use vidlift_core::models::{
    DeleteReport, FinalizedObject, InitiateSessionRequest, ObjectEntry, PartReceipt, PartUrl,
    PresignResponse, SessionProgress, SessionTicket, SignedMethod, TransferStrategy,
    UploadSession,
};
use vidlift_core::{Config, TransferError, TransferResult};
use vidlift_storage::keys::{staging_key, staging_prefix, validate_key};
use vidlift_storage::{delete_from_all, part_params, Storage, StorageSet, UrlSigner};

use crate::reassembler;
use crate::session::ChunkSessionStore;
use crate::splitter::part_count;

/// Limits and defaults applied by the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub default_chunk_size: u64,
    pub max_part_count: u32,
    pub max_part_size: u64,
    pub presign_expiry: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        CoordinatorSettings {
            default_chunk_size: config.chunk_size_bytes(),
            max_part_count: config.max_part_count(),
            max_part_size: config.max_part_size_bytes(),
            presign_expiry: config.presign_expiry(),
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    storage: StorageSet,
    sessions: Arc<ChunkSessionStore>,
    settings: Arc<CoordinatorSettings>,
}

impl Coordinator {
    pub fn new(
        storage: StorageSet,
        sessions: ChunkSessionStore,
        settings: CoordinatorSettings,
    ) -> Self {
        Coordinator {
            storage,
            sessions: Arc::new(sessions),
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(config: &Config, storage: StorageSet) -> Self {
        Self::new(
            storage,
            ChunkSessionStore::from_config(config),
            CoordinatorSettings::from_config(config),
        )
    }

    /// Backend that receives uploads.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage.primary
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.storage.signer
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &ChunkSessionStore {
        &self.sessions
    }

    fn expiry_or_default(&self, expiry: Option<Duration>) -> Duration {
        expiry.unwrap_or(self.settings.presign_expiry)
    }

    /// Open an upload session for `target_name` with `total_parts` parts.
    ///
    /// For the direct strategy the backend multipart upload is started here and its id is
    /// kept on the session.
    pub async fn initiate_session(
        &self,
        target_name: &str,
        total_parts: u32,
        strategy: TransferStrategy,
    ) -> TransferResult<SessionTicket> {
        validate_key(target_name)?;
        if target_name.starts_with(&format!("{}/", STAGING_PREFIX)) {
            return Err(TransferError::InvalidArgument(format!(
                "Target names under {}/ are reserved",
                STAGING_PREFIX
            )));
        }
        if total_parts > self.settings.max_part_count {
            return Err(TransferError::InvalidArgument(format!(
                "{} parts exceeds the limit of {}",
                total_parts, self.settings.max_part_count
            )));
        }

        self.reap_expired().await;

        let upload_id = match strategy {
            TransferStrategy::Direct if total_parts > 0 => Some(
                self.storage()
                    .initiate_multipart(target_name, DEFAULT_CONTENT_TYPE)
                    .await?,
            ),
            _ => None,
        };

        let session = match self
            .sessions
            .initiate_with(target_name, total_parts, strategy, upload_id.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Some(upload_id) = &upload_id {
                    if let Err(abort_err) =
                        self.storage().abort_multipart(target_name, upload_id).await
                    {
                        tracing::warn!(error = %abort_err, target = %target_name, "Failed to abort multipart upload");
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            session_id = %session.session_id,
            target = %target_name,
            parts = total_parts,
            strategy = %strategy,
            "Upload session initiated"
        );

        Ok(SessionTicket {
            session_id: session.session_id,
            target_name: session.target_name,
            strategy,
            part_count: total_parts,
            chunk_size: None,
            total_size: None,
            upload_id: session.upload_id,
            part_urls: Vec::new(),
        })
    }

    /// Open a session from an HTTP request: plan the parts and, for the direct strategy,
    /// sign one PUT URL per part.
    pub async fn initiate_upload(
        &self,
        request: &InitiateSessionRequest,
    ) -> TransferResult<SessionTicket> {
        let chunk_size = request.chunk_size.unwrap_or(self.settings.default_chunk_size);
        if chunk_size > self.settings.max_part_size {
            return Err(TransferError::InvalidArgument(format!(
                "Chunk size {} exceeds the maximum part size {}",
                chunk_size, self.settings.max_part_size
            )));
        }
        let parts = part_count(request.total_size, chunk_size)?;
        let strategy = request.strategy.unwrap_or_default();

        let mut ticket = self
            .initiate_session(&request.target_name, parts, strategy)
            .await?;
        ticket.chunk_size = Some(chunk_size);
        ticket.total_size = Some(request.total_size);

        if strategy == TransferStrategy::Direct {
            let mut urls = Vec::with_capacity(parts as usize);
            for index in 0..parts {
                match self.signed_part_url(ticket.session_id, index, None).await {
                    Ok(url) => urls.push(url),
                    Err(e) => {
                        if let Err(abort_err) = self.abort(ticket.session_id).await {
                            tracing::warn!(error = %abort_err, "Failed to abort session");
                        }
                        return Err(e);
                    }
                }
            }
            ticket.part_urls = urls;
        }

        Ok(ticket)
    }

    /// Proxied strategy: store one part payload and record its index.
    pub async fn submit_part(
        &self,
        session_id: Uuid,
        index: u32,
        payload: Bytes,
    ) -> TransferResult<PartReceipt> {
        let session = self.sessions.get(session_id).await?;
        if session.strategy != TransferStrategy::Proxied {
            return Err(TransferError::InvalidArgument(format!(
                "Session {} uses the {} strategy; request signed part URLs instead",
                session_id, session.strategy
            )));
        }
        if !session.contains_index(index) {
            return Err(TransferError::IndexOutOfRange {
                session_id,
                index,
                expected: session.expected_part_count,
            });
        }
        let size = payload.len() as u64;
        if size > self.settings.max_part_size {
            return Err(TransferError::InvalidArgument(format!(
                "Part {} is {} bytes, the limit is {}",
                index, size, self.settings.max_part_size
            )));
        }

        let key = staging_key(session_id, index);
        self.storage()
            .put_object(&key, payload, DEFAULT_CONTENT_TYPE)
            .await?;

        if let Err(e) = self.sessions.record_part(session_id, index).await {
            // The session went away while the part was being written
            if let Err(cleanup) = self.storage().delete_object(&key).await {
                tracing::warn!(error = %cleanup, key = %key, "Failed to delete orphaned staged part");
            }
            return Err(e);
        }

        tracing::debug!(session_id = %session_id, index = index, size_bytes = size, "Part staged");

        Ok(PartReceipt {
            session_id,
            index,
            etag: None,
            size: Some(size),
        })
    }

    /// Direct strategy: signed PUT URL scoped to this session's target, upload id and part.
    pub async fn signed_part_url(
        &self,
        session_id: Uuid,
        index: u32,
        expiry: Option<Duration>,
    ) -> TransferResult<PartUrl> {
        let session = self.sessions.get(session_id).await?;
        let upload_id = Self::direct_upload_id(&session)?;
        if !session.contains_index(index) {
            return Err(TransferError::IndexOutOfRange {
                session_id,
                index,
                expected: session.expected_part_count,
            });
        }

        let expiry = self.expiry_or_default(expiry);
        let url = self
            .storage()
            .presign(
                SignedMethod::Put,
                &session.target_name,
                expiry,
                &part_params(upload_id, index),
            )
            .await?;

        Ok(PartUrl {
            index,
            url,
            expires_at: Utc::now() + chrono::Duration::seconds(expiry.as_secs() as i64),
        })
    }

    /// Direct strategy: record the completion token of a part uploaded through a signed URL.
    pub async fn acknowledge_part(
        &self,
        session_id: Uuid,
        index: u32,
        etag: String,
    ) -> TransferResult<PartReceipt> {
        let session = self.sessions.get(session_id).await?;
        Self::direct_upload_id(&session)?;
        if etag.trim().is_empty() {
            return Err(TransferError::InvalidArgument(
                "Completion token must not be empty".to_string(),
            ));
        }

        self.sessions
            .record_part_with_token(session_id, index, Some(etag.clone()))
            .await?;

        tracing::debug!(session_id = %session_id, index = index, "Part acknowledged");

        Ok(PartReceipt {
            session_id,
            index,
            etag: Some(etag),
            size: None,
        })
    }

    fn direct_upload_id(session: &UploadSession) -> TransferResult<&str> {
        if session.strategy != TransferStrategy::Direct {
            return Err(TransferError::InvalidArgument(format!(
                "Session {} uses the {} strategy; submit parts through the coordinator",
                session.session_id, session.strategy
            )));
        }
        session.upload_id.as_deref().ok_or_else(|| {
            TransferError::Internal(format!(
                "Direct session {} has no multipart upload",
                session.session_id
            ))
        })
    }

    /// Byte-range read of a stored object.
    pub async fn fetch_part(&self, source: &str, range: Range<u64>) -> TransferResult<Bytes> {
        validate_key(source)?;
        Ok(self.storage().get_object_range(source, range).await?)
    }

    pub async fn fetch_object(&self, source: &str) -> TransferResult<Bytes> {
        validate_key(source)?;
        Ok(self.storage().get_object(source).await?)
    }

    pub async fn object_size(&self, source: &str) -> TransferResult<u64> {
        validate_key(source)?;
        Ok(self.storage().content_length(source).await?)
    }

    /// Signed GET URL for a stored object.
    pub async fn signed_download_url(
        &self,
        source: &str,
        expiry: Option<Duration>,
    ) -> TransferResult<String> {
        Ok(self
            .presign_object(source, SignedMethod::Get, expiry)
            .await?
            .url)
    }

    /// Signed URL for a whole object. GET requires the object to exist.
    pub async fn presign_object(
        &self,
        name: &str,
        method: SignedMethod,
        expiry: Option<Duration>,
    ) -> TransferResult<PresignResponse> {
        validate_key(name)?;
        if method == SignedMethod::Get && !self.storage().exists(name).await? {
            return Err(TransferError::NotFound(name.to_string()));
        }

        let expiry = self.expiry_or_default(expiry);
        let url = self.storage().presign(method, name, expiry, &[]).await?;
        Ok(PresignResponse {
            url,
            method,
            expires_at: Utc::now() + chrono::Duration::seconds(expiry.as_secs() as i64),
        })
    }

    /// Write the target object from a complete session and dispose of the session.
    ///
    /// An incomplete session fails with `IncompleteUpload` and stays open. While one
    /// finalize is writing, a concurrent finalize of the same session fails with
    /// `SessionConflict`. A failed write releases the session so it can be retried or
    /// aborted.
    pub async fn finalize(&self, session_id: Uuid) -> TransferResult<FinalizedObject> {
        let session = self.sessions.claim_for_finalize(session_id).await?;
        let start = std::time::Instant::now();

        let written = match session.strategy {
            TransferStrategy::Proxied => {
                reassembler::assemble_staged(self.storage().clone(), &session).await
            }
            TransferStrategy::Direct => {
                reassembler::complete_multipart(self.storage().as_ref(), &session).await
            }
        };
        let size = match written {
            Ok(size) => size,
            Err(e) => {
                self.sessions.release(session_id).await;
                return Err(e);
            }
        };

        self.sessions.dispose(session_id).await;

        tracing::info!(
            session_id = %session_id,
            target = %session.target_name,
            parts = session.expected_part_count,
            size_bytes = size,
            strategy = %session.strategy,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload finalized"
        );

        Ok(FinalizedObject {
            target_name: session.target_name,
            size,
            part_count: session.expected_part_count,
            strategy: session.strategy,
        })
    }

    /// Drop a session and everything staged for it.
    pub async fn abort(&self, session_id: Uuid) -> TransferResult<()> {
        let session = self
            .sessions
            .dispose(session_id)
            .await
            .ok_or(TransferError::SessionNotFound(session_id))?;
        self.cleanup_artifacts(&session).await;

        tracing::info!(
            session_id = %session_id,
            target = %session.target_name,
            "Upload session aborted"
        );
        Ok(())
    }

    async fn cleanup_artifacts(&self, session: &UploadSession) {
        let storage = self.storage();
        match session.strategy {
            TransferStrategy::Proxied => {
                let staged = match storage
                    .list_objects(&staging_prefix(session.session_id))
                    .await
                {
                    Ok(staged) => staged,
                    Err(e) => {
                        tracing::warn!(error = %e, session_id = %session.session_id, "Failed to list staged parts");
                        return;
                    }
                };
                for entry in staged {
                    match storage.delete_object(&entry.name).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => {
                            tracing::warn!(error = %e, key = %entry.name, "Failed to delete staged part")
                        }
                    }
                }
            }
            TransferStrategy::Direct => {
                if let Some(upload_id) = &session.upload_id {
                    if let Err(e) = storage
                        .abort_multipart(&session.target_name, upload_id)
                        .await
                    {
                        tracing::warn!(error = %e, upload_id = %upload_id, "Failed to abort multipart upload");
                    }
                }
            }
        }
    }

    /// Sweep expired sessions and clean their staged artifacts. Returns how many were reaped.
    pub async fn reap_expired(&self) -> usize {
        let expired = self.sessions.sweep_expired().await;
        for session in &expired {
            tracing::info!(
                session_id = %session.session_id,
                target = %session.target_name,
                "Reaping expired upload session"
            );
            self.cleanup_artifacts(session).await;
        }
        expired.len()
    }

    /// List stored objects on the primary backend and every mirror, tagged by source.
    ///
    /// Staged parts of open sessions are not listed.
    pub async fn list_objects(&self, prefix: &str) -> TransferResult<Vec<ObjectEntry>> {
        let backends = self.storage.all();
        let listings = try_join_all(
            backends
                .iter()
                .map(|storage| async move { storage.list_objects(prefix).await }),
        )
        .await?;

        let staging = format!("{}/", STAGING_PREFIX);
        Ok(listings
            .into_iter()
            .flatten()
            .filter(|entry| !entry.name.starts_with(&staging))
            .collect())
    }

    /// Delete an object from every backend that may hold a copy.
    pub async fn delete_object(&self, name: &str) -> TransferResult<DeleteReport> {
        validate_key(name)?;
        let report = delete_from_all(&self.storage.all(), name).await;
        tracing::info!(
            key = %name,
            deleted = report.deleted.len(),
            not_found = report.not_found.len(),
            failed = report.failed.len(),
            "Object delete fanned out"
        );
        Ok(report)
    }

    pub async fn progress(&self, session_id: Uuid) -> TransferResult<SessionProgress> {
        let session = self.sessions.get(session_id).await?;
        Ok(SessionProgress::from(&session))
    }
}
