//! Deleting one object from every backend that may hold it.

use std::sync::Arc;

use futures::future::join_all;
use vidlift_core::models::{DeleteFailure, DeleteReport};

use crate::traits::{Storage, StorageError};

/// Delete `key` from each backend and aggregate the per-backend results.
///
/// Backends are tried concurrently. An absent object is reported under `not_found`
/// and does not count as a failure.
pub async fn delete_from_all(backends: &[Arc<dyn Storage>], key: &str) -> DeleteReport {
    let results = join_all(backends.iter().map(|storage| async move {
        (storage.backend_type(), storage.delete_object(key).await)
    }))
    .await;

    let mut report = DeleteReport::new(key);
    for (backend, result) in results {
        match result {
            Ok(()) => report.deleted.push(backend),
            Err(StorageError::NotFound(_)) => report.not_found.push(backend),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    backend = %backend,
                    "Failed to delete object from backend"
                );
                report.failed.push(DeleteFailure {
                    backend,
                    error: e.to_string(),
                });
            }
        }
    }

    report
}
