use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage_types::StorageBackend;

/// How part payloads travel between the client and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Every part passes through the coordinating process.
    #[default]
    Proxied,
    /// Parts move straight to/from the backend through signed URLs.
    Direct,
}

impl TransferStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStrategy::Proxied => "proxied",
            TransferStrategy::Direct => "direct",
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proxied" | "proxy" => Ok(TransferStrategy::Proxied),
            "direct" | "presigned" => Ok(TransferStrategy::Direct),
            other => Err(anyhow::anyhow!("Unknown transfer strategy: {}", other)),
        }
    }
}

/// HTTP method a signed URL is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedMethod::Get => "GET",
            SignedMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for SignedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignedMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(SignedMethod::Get),
            "PUT" => Ok(SignedMethod::Put),
            other => Err(anyhow::anyhow!("Unsupported signed URL method: {}", other)),
        }
    }
}

/// One stored object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub size: u64,
    /// Backend the entry was found on
    pub source: StorageBackend,
}

/// Summary of a settled transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub target_name: String,
    pub strategy: TransferStrategy,
    pub duration: Duration,
    pub bytes_transferred: u64,
    pub part_count: u32,
}

impl TransferOutcome {
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            return self.bytes_transferred as f64;
        }
        self.bytes_transferred as f64 / secs
    }
}

/// The object written by a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedObject {
    pub target_name: String,
    pub size: u64,
    pub part_count: u32,
    pub strategy: TransferStrategy,
}

/// A backend that failed to delete an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub backend: StorageBackend,
    pub error: String,
}

/// Per-backend results of deleting one object everywhere it may live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub name: String,
    pub deleted: Vec<StorageBackend>,
    pub not_found: Vec<StorageBackend>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn new(name: impl Into<String>) -> Self {
        DeleteReport {
            name: name.into(),
            ..Default::default()
        }
    }

    /// No backend reported a hard failure (absent copies are fine).
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// At least one backend actually held the object.
    pub fn removed_anywhere(&self) -> bool {
        !self.deleted.is_empty()
    }
}
