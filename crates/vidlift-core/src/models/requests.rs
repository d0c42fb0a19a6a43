use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::transfer::{ObjectEntry, SignedMethod, TransferStrategy};

/// Request to open a chunked upload session
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct InitiateSessionRequest {
    /// Name of the object being assembled
    #[validate(length(
        min = 1,
        max = 1024,
        message = "Target name must be between 1 and 1024 characters"
    ))]
    pub target_name: String,
    /// Total size of the object in bytes
    pub total_size: u64,
    /// Part size in bytes (server default when omitted)
    #[serde(default)]
    #[validate(range(min = 1, message = "Chunk size must be at least 1 byte"))]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub strategy: Option<TransferStrategy>,
}

/// Signed URL for one part of a direct upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUrl {
    pub index: u32,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Response to a session initiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTicket {
    pub session_id: Uuid,
    pub target_name: String,
    pub strategy: TransferStrategy,
    pub part_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    /// Backend multipart id (direct strategy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Per-part signed URLs (direct strategy only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_urls: Vec<PartUrl>,
}

/// Acknowledgement of a part uploaded through a signed URL
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct AcknowledgePartRequest {
    #[validate(length(min = 1, max = 1024, message = "ETag must not be empty"))]
    pub etag: String,
}

/// Query for whole-object signed URLs
#[derive(Debug, Deserialize, Validate)]
pub struct PresignQuery {
    #[validate(length(min = 1, max = 1024, message = "Object name must not be empty"))]
    pub name: String,
    #[serde(default)]
    pub method: Option<SignedMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignResponse {
    pub url: String,
    pub method: SignedMethod,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSizeResponse {
    pub name: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_request_rejects_empty_target() {
        let request = InitiateSessionRequest {
            target_name: String::new(),
            total_size: 10,
            chunk_size: None,
            strategy: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn initiate_request_rejects_zero_chunk() {
        let request: InitiateSessionRequest = serde_json::from_str(
            r#"{"target_name":"clip.mp4","total_size":10,"chunk_size":0,"strategy":"direct"}"#,
        )
        .unwrap();
        assert_eq!(request.strategy, Some(TransferStrategy::Direct));
        assert!(request.validate().is_err());
    }
}
