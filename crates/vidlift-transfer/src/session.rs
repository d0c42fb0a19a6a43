//! Session bookkeeping for in-progress chunked uploads.
//!
//! The store is an injected value with a capacity bound and an idle TTL. Expired
//! sessions behave as if they did not exist; [`ChunkSessionStore::sweep_expired`]
//! removes them and hands them back so their staged artifacts can be cleaned.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use vidlift_core::models::{TransferStrategy, UploadSession};
use vidlift_core::{Config, TransferError, TransferResult};

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<Uuid, UploadSession>,
    /// Open session per target name
    by_target: HashMap<String, Uuid>,
    /// Sessions whose target object is being written
    finalizing: HashSet<Uuid>,
}

impl SessionTable {
    fn remove(&mut self, session_id: Uuid) -> Option<UploadSession> {
        let session = self.sessions.remove(&session_id)?;
        self.finalizing.remove(&session_id);
        if self.by_target.get(&session.target_name) == Some(&session_id) {
            self.by_target.remove(&session.target_name);
        }
        Some(session)
    }
}

pub struct ChunkSessionStore {
    table: RwLock<SessionTable>,
    capacity: usize,
    ttl: Duration,
}

impl ChunkSessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        ChunkSessionStore {
            table: RwLock::new(SessionTable::default()),
            capacity,
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.session_capacity(), config.session_ttl())
    }

    /// Open a proxied session for `target_name` expecting `expected_part_count` parts.
    pub async fn initiate(&self, target_name: &str, expected_part_count: u32) -> TransferResult<Uuid> {
        let session = self
            .initiate_with(target_name, expected_part_count, TransferStrategy::Proxied, None)
            .await?;
        Ok(session.session_id)
    }

    /// Open a session and return a snapshot of it.
    pub async fn initiate_with(
        &self,
        target_name: &str,
        expected_part_count: u32,
        strategy: TransferStrategy,
        upload_id: Option<String>,
    ) -> TransferResult<UploadSession> {
        if target_name.trim().is_empty() {
            return Err(TransferError::InvalidArgument(
                "Target name must not be empty".to_string(),
            ));
        }
        if expected_part_count == 0 {
            return Err(TransferError::InvalidArgument(
                "Expected part count must be greater than 0".to_string(),
            ));
        }

        let now = Utc::now();
        let mut table = self.table.write().await;

        if let Some(existing) = table
            .by_target
            .get(target_name)
            .and_then(|id| table.sessions.get(id))
        {
            if !existing.is_expired(self.ttl, now) {
                return Err(TransferError::SessionConflict {
                    target: target_name.to_string(),
                    existing: existing.session_id,
                });
            }
        }

        let live = table
            .sessions
            .values()
            .filter(|session| !session.is_expired(self.ttl, now))
            .count();
        if live >= self.capacity {
            return Err(TransferError::SessionLimitExceeded {
                capacity: self.capacity,
            });
        }

        let mut session =
            UploadSession::new(target_name.to_string(), expected_part_count, strategy);
        session.upload_id = upload_id;

        table
            .by_target
            .insert(session.target_name.clone(), session.session_id);
        table.sessions.insert(session.session_id, session.clone());

        tracing::debug!(
            session_id = %session.session_id,
            target = %session.target_name,
            parts = expected_part_count,
            strategy = %strategy,
            "Upload session opened"
        );

        Ok(session)
    }

    /// Mark `index` as received. Recording the same index twice is a no-op.
    pub async fn record_part(&self, session_id: Uuid, index: u32) -> TransferResult<()> {
        self.record_part_with_token(session_id, index, None).await
    }

    /// Mark `index` as received together with its backend completion token.
    pub async fn record_part_with_token(
        &self,
        session_id: Uuid,
        index: u32,
        token: Option<String>,
    ) -> TransferResult<()> {
        let mut table = self.table.write().await;
        let session = table
            .sessions
            .get_mut(&session_id)
            .filter(|session| !session.is_expired(self.ttl, Utc::now()))
            .ok_or(TransferError::SessionNotFound(session_id))?;

        if !session.contains_index(index) {
            return Err(TransferError::IndexOutOfRange {
                session_id,
                index,
                expected: session.expected_part_count,
            });
        }

        session.record(index, token);
        Ok(())
    }

    /// Snapshot of a live session.
    pub async fn get(&self, session_id: Uuid) -> TransferResult<UploadSession> {
        let table = self.table.read().await;
        table
            .sessions
            .get(&session_id)
            .filter(|session| !session.is_expired(self.ttl, Utc::now()))
            .cloned()
            .ok_or(TransferError::SessionNotFound(session_id))
    }

    pub async fn is_complete(&self, session_id: Uuid) -> TransferResult<bool> {
        Ok(self.get(session_id).await?.is_complete())
    }

    pub async fn missing_parts(&self, session_id: Uuid) -> TransferResult<Vec<u32>> {
        Ok(self.get(session_id).await?.missing_parts())
    }

    /// Claim a complete session for finalization.
    ///
    /// Only one caller can hold the claim. A second claim fails with `SessionConflict`
    /// until [`ChunkSessionStore::release`] or [`ChunkSessionStore::dispose`] runs.
    /// Claimed sessions are never swept.
    pub async fn claim_for_finalize(&self, session_id: Uuid) -> TransferResult<UploadSession> {
        let mut table = self.table.write().await;
        let session = table
            .sessions
            .get(&session_id)
            .filter(|session| !session.is_expired(self.ttl, Utc::now()))
            .cloned()
            .ok_or(TransferError::SessionNotFound(session_id))?;

        if !session.is_complete() {
            return Err(TransferError::IncompleteUpload {
                missing: session.missing_parts(),
                target: session.target_name,
            });
        }
        if !table.finalizing.insert(session_id) {
            return Err(TransferError::SessionConflict {
                target: session.target_name,
                existing: session_id,
            });
        }
        Ok(session)
    }

    /// Give up a finalize claim, leaving the session open.
    pub async fn release(&self, session_id: Uuid) {
        self.table.write().await.finalizing.remove(&session_id);
    }

    /// Remove a session. Unknown ids are a no-op.
    pub async fn dispose(&self, session_id: Uuid) -> Option<UploadSession> {
        self.table.write().await.remove(session_id)
    }

    /// Remove and return every session idle for longer than the TTL.
    pub async fn sweep_expired(&self) -> Vec<UploadSession> {
        let now = Utc::now();
        let mut table = self.table.write().await;
        let expired: Vec<Uuid> = table
            .sessions
            .values()
            .filter(|session| session.is_expired(self.ttl, now))
            .map(|session| session.session_id)
            .filter(|session_id| !table.finalizing.contains(session_id))
            .collect();

        expired
            .into_iter()
            .filter_map(|session_id| table.remove(session_id))
            .collect()
    }

    /// Number of tracked sessions, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.table.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    async fn backdate(&self, session_id: Uuid, by: chrono::Duration) {
        if let Some(session) = self.table.write().await.sessions.get_mut(&session_id) {
            session.last_activity_at -= by;
        }
    }
}
