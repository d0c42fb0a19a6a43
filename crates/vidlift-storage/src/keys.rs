//! Shared key rules for storage backends.
//!
//! Staged parts of a proxied upload live under `staging/{session_id}/{index:05}` until
//! the session is finalized or aborted.

use uuid::Uuid;
use vidlift_core::constants::STAGING_PREFIX;

use crate::traits::{StorageError, StorageResult};

/// Reject keys every backend must refuse: empty, absolute, or containing `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key must be relative: {}",
            key
        )));
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid segments: {}",
            key
        )));
    }
    Ok(())
}

/// Prefix holding every staged part of one session.
pub fn staging_prefix(session_id: Uuid) -> String {
    format!("{}/{}/", STAGING_PREFIX, session_id)
}

/// Key of one staged part. Zero-padded so lexical order matches index order.
pub fn staging_key(session_id: Uuid, index: u32) -> String {
    format!("{}{:05}", staging_prefix(session_id), index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_absolute_keys() {
        assert!(validate_key("videos/clip.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("videos/../../secret").is_err());
        assert!(validate_key("videos\\clip.mp4").is_err());
    }

    #[test]
    fn staging_keys_sort_by_index() {
        let session = Uuid::new_v4();
        let k2 = staging_key(session, 2);
        let k10 = staging_key(session, 10);
        assert!(k2 < k10);
        assert!(k10.starts_with(&staging_prefix(session)));
        assert!(k10.ends_with("/00010"));
    }
}
