//! Part planning: where each part of an object starts and how long it is.

use vidlift_core::models::PartSpec;
use vidlift_core::{TransferError, TransferResult};

/// Number of parts `total_len` bytes split into at `chunk_size`.
///
/// An empty object still has one (empty) part so it can be uploaded and finalized.
pub fn part_count(total_len: u64, chunk_size: u64) -> TransferResult<u32> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidArgument(
            "Chunk size must be greater than 0".to_string(),
        ));
    }
    let count = total_len.div_ceil(chunk_size).max(1);
    u32::try_from(count).map_err(|_| {
        TransferError::InvalidArgument(format!(
            "{} bytes at chunk size {} needs too many parts",
            total_len, chunk_size
        ))
    })
}

/// Split `total_len` bytes into parts of `chunk_size` (the last one may be shorter).
pub fn plan_parts(total_len: u64, chunk_size: u64) -> TransferResult<Vec<PartSpec>> {
    let count = part_count(total_len, chunk_size)?;
    Ok((0..count)
        .map(|index| {
            let offset = index as u64 * chunk_size;
            PartSpec {
                index,
                offset,
                len: chunk_size.min(total_len - offset.min(total_len)),
            }
        })
        .collect())
}
