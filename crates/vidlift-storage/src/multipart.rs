//! Multipart bookkeeping shared by the local and memory backends.

use sha2::{Digest, Sha256};
use vidlift_core::models::CompletedPart;

use crate::traits::{StorageError, StorageResult};

/// Completion token for a part payload (hex SHA-256).
pub(crate) fn part_etag(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check a completion request against the parts actually uploaded.
///
/// `uploaded` holds `(index, etag)` for every stored part in ascending index order. The
/// request must list every uploaded part exactly once, in ascending order starting at 0,
/// with matching tokens.
pub(crate) fn validate_completion(
    upload_id: &str,
    uploaded: &[(u32, String)],
    requested: &[CompletedPart],
) -> StorageResult<()> {
    if requested.is_empty() {
        return Err(StorageError::MultipartFailed(format!(
            "Upload {} completed without parts",
            upload_id
        )));
    }

    for (position, part) in requested.iter().enumerate() {
        if part.index as usize != position {
            return Err(StorageError::MultipartFailed(format!(
                "Upload {}: part {} listed at position {} (parts must be contiguous and ascending)",
                upload_id, part.index, position
            )));
        }
        match uploaded.get(position) {
            Some((index, etag)) if *index == part.index && *etag == part.etag => {}
            Some((index, _)) if *index == part.index => {
                return Err(StorageError::MultipartFailed(format!(
                    "Upload {}: token mismatch for part {}",
                    upload_id, part.index
                )));
            }
            _ => {
                return Err(StorageError::MultipartFailed(format!(
                    "Upload {}: part {} was never uploaded",
                    upload_id, part.index
                )));
            }
        }
    }

    if uploaded.len() != requested.len() {
        return Err(StorageError::MultipartFailed(format!(
            "Upload {}: {} parts uploaded but {} listed for completion",
            upload_id,
            uploaded.len(),
            requested.len()
        )));
    }

    Ok(())
}
