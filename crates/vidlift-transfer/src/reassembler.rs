//! Reassembly of parts into the final object.
//!
//! Proxied uploads are assembled from staged part objects by streaming them in order.
//! Direct uploads are assembled by the backend's multipart completion, fed with the
//! complete token list in index order.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use tokio_util::io::StreamReader;
use vidlift_core::constants::DEFAULT_CONTENT_TYPE;
use vidlift_core::models::{CompletedPart, Part, UploadSession};
use vidlift_core::{TransferError, TransferResult};
use vidlift_storage::keys::staging_key;
use vidlift_storage::Storage;

/// Fail with `IncompleteUpload` unless every index has been received.
pub fn verify_complete(session: &UploadSession) -> TransferResult<()> {
    if session.is_complete() {
        return Ok(());
    }
    Err(TransferError::IncompleteUpload {
        target: session.target_name.clone(),
        missing: session.missing_parts(),
    })
}

/// Concatenate parts in index order regardless of the order they arrived in.
pub fn assemble(
    target: &str,
    parts: Vec<Part>,
    expected_count: u32,
    expected_len: u64,
) -> TransferResult<Bytes> {
    let mut slots: Vec<Option<Bytes>> = vec![None; expected_count as usize];
    for part in parts {
        let slot = slots.get_mut(part.index as usize).ok_or_else(|| {
            TransferError::InvalidArgument(format!(
                "Part {} of {} is outside 0..{}",
                part.index, target, expected_count
            ))
        })?;
        if slot.is_some() {
            return Err(TransferError::InvalidArgument(format!(
                "Part {} of {} supplied twice",
                part.index, target
            )));
        }
        *slot = Some(part.payload);
    }

    let missing: Vec<u32> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(index, _)| index as u32)
        .collect();
    if !missing.is_empty() {
        return Err(TransferError::IncompleteUpload {
            target: target.to_string(),
            missing,
        });
    }

    let mut buffer = BytesMut::with_capacity(expected_len as usize);
    for payload in slots.into_iter().flatten() {
        buffer.extend_from_slice(&payload);
    }

    if buffer.len() as u64 != expected_len {
        return Err(TransferError::Internal(format!(
            "Reassembled {} is {} bytes, expected {}",
            target,
            buffer.len(),
            expected_len
        )));
    }

    Ok(buffer.freeze())
}

/// Completion tokens in strictly ascending index order `0..n`.
pub fn ordered_tokens(session: &UploadSession) -> TransferResult<Vec<CompletedPart>> {
    verify_complete(session)?;

    let mut tokens = Vec::with_capacity(session.expected_part_count as usize);
    let mut missing = Vec::new();
    for index in 0..session.expected_part_count {
        match session.received_parts.get(&index) {
            Some(Some(etag)) => tokens.push(CompletedPart {
                index,
                etag: etag.clone(),
            }),
            _ => missing.push(index),
        }
    }

    if !missing.is_empty() {
        return Err(TransferError::IncompleteUpload {
            target: session.target_name.clone(),
            missing,
        });
    }
    Ok(tokens)
}

/// Concatenate the staged parts of a proxied session into the target object.
///
/// Staged parts are read back one at a time in index order and streamed into the
/// target, so at most one part is held in memory. Staged parts are removed afterwards.
/// Returns the size of the written object.
pub async fn assemble_staged(
    storage: Arc<dyn Storage>,
    session: &UploadSession,
) -> TransferResult<u64> {
    verify_complete(session)?;

    let session_id = session.session_id;
    let source = storage.clone();
    let staged = stream::iter(0..session.expected_part_count)
        .then(move |index| {
            let source = source.clone();
            async move {
                source
                    .get_object(&staging_key(session_id, index))
                    .await
                    .map_err(|e| io::Error::other(format!("staged part {}: {}", index, e)))
            }
        })
        .boxed();

    let size = storage
        .put_object_stream(
            &session.target_name,
            DEFAULT_CONTENT_TYPE,
            Box::pin(StreamReader::new(staged)),
        )
        .await?;

    for index in 0..session.expected_part_count {
        let key = staging_key(session_id, index);
        if let Err(e) = storage.delete_object(&key).await {
            tracing::warn!(error = %e, key = %key, "Failed to delete staged part");
        }
    }

    Ok(size)
}

/// Complete a direct session's backend multipart upload. Returns the object size.
pub async fn complete_multipart(
    storage: &dyn Storage,
    session: &UploadSession,
) -> TransferResult<u64> {
    let tokens = ordered_tokens(session)?;
    let upload_id = session.upload_id.as_deref().ok_or_else(|| {
        TransferError::Internal(format!(
            "Direct session {} has no multipart upload",
            session.session_id
        ))
    })?;

    Ok(storage
        .complete_multipart(&session.target_name, upload_id, &tokens)
        .await?)
}
