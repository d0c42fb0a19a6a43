use std::ops::Range;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of one part inside the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

impl PartSpec {
    /// Byte range `[offset, offset + len)` covered by this part.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.len
    }
}

/// A part payload in flight. Payloads are never shared between parts.
#[derive(Debug, Clone)]
pub struct Part {
    pub index: u32,
    pub payload: Bytes,
    pub etag: Option<String>,
}

impl Part {
    pub fn new(index: u32, payload: Bytes) -> Self {
        Part {
            index,
            payload,
            etag: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Completion token pair handed to a backend multipart completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub index: u32,
    pub etag: String,
}

/// Acknowledgement that a part was stored and recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReceipt {
    pub session_id: Uuid,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Payload size when the bytes passed through the coordinator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
