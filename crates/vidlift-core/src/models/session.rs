use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transfer::TransferStrategy;

/// Bookkeeping for one in-progress chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub session_id: Uuid,
    pub target_name: String,
    pub expected_part_count: u32,
    /// Received indices with the backend completion token when one exists
    pub received_parts: BTreeMap<u32, Option<String>>,
    pub strategy: TransferStrategy,
    /// Backend multipart upload id (direct strategy only)
    pub upload_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(target_name: String, expected_part_count: u32, strategy: TransferStrategy) -> Self {
        let now = Utc::now();
        UploadSession {
            session_id: Uuid::new_v4(),
            target_name,
            expected_part_count,
            received_parts: BTreeMap::new(),
            strategy,
            upload_id: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received_parts.len() as u32 == self.expected_part_count
    }

    /// Indices in `[0, expected_part_count)` not yet received, ascending.
    pub fn missing_parts(&self) -> Vec<u32> {
        (0..self.expected_part_count)
            .filter(|index| !self.received_parts.contains_key(index))
            .collect()
    }

    pub fn contains_index(&self, index: u32) -> bool {
        index < self.expected_part_count
    }

    /// Record an index. Re-recording refreshes the token.
    pub fn record(&mut self, index: u32, token: Option<String>) {
        self.received_parts.insert(index, token);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.last_activity_at > ttl,
            Err(_) => false,
        }
    }
}

/// Client-facing view of an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: Uuid,
    pub target_name: String,
    pub strategy: TransferStrategy,
    pub expected_part_count: u32,
    pub received_part_count: u32,
    pub missing_parts: Vec<u32>,
    pub complete: bool,
}

impl From<&UploadSession> for SessionProgress {
    fn from(session: &UploadSession) -> Self {
        SessionProgress {
            session_id: session.session_id,
            target_name: session.target_name.clone(),
            strategy: session.strategy,
            expected_part_count: session.expected_part_count,
            received_part_count: session.received_parts.len() as u32,
            missing_parts: session.missing_parts(),
            complete: session.is_complete(),
        }
    }
}
