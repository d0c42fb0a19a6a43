//! Byte-range helpers shared by backends and the HTTP surface.

use std::ops::Range;

use crate::traits::{StorageError, StorageResult};

/// Check that `range` can be served from an object of `size` bytes.
pub fn check_range(key: &str, range: &Range<u64>, size: u64) -> StorageResult<()> {
    if range.start > range.end || range.end > size {
        return Err(StorageError::RangeUnsatisfiable {
            key: key.to_string(),
            start: range.start,
            end: range.end,
            size,
        });
    }
    Ok(())
}

/// Render an end-exclusive range as an HTTP `Range` header value.
///
/// Callers must not pass an empty range; HTTP has no syntax for it.
pub fn format_range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

/// Parse a single-range `Range: bytes=a-b` header into an end-exclusive range.
///
/// Open-ended (`bytes=a-`) and suffix (`bytes=-n`) forms are resolved against `size`.
/// Returns `None` for malformed or multi-range headers.
pub fn parse_range_header(value: &str, size: u64) -> Option<Range<u64>> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            Some(start..end.checked_add(1)?)
        }
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            Some(start..size)
        }
        (true, false) => {
            let suffix: u64 = end.parse().ok()?;
            Some(size.saturating_sub(suffix)..size)
        }
        (true, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_past_end_is_unsatisfiable() {
        assert!(check_range("clip", &(0..10), 10).is_ok());
        assert!(check_range("clip", &(10..10), 10).is_ok());
        let err = check_range("clip", &(5..11), 10).unwrap_err();
        assert!(matches!(
            err,
            StorageError::RangeUnsatisfiable { size: 10, end: 11, .. }
        ));
        assert!(check_range("clip", &(6..5), 10).is_err());
    }

    #[test]
    fn header_is_inclusive_on_the_wire() {
        assert_eq!(format_range_header(&(0..5)), "bytes=0-4");
        assert_eq!(parse_range_header("bytes=0-4", 100), Some(0..5));
        assert_eq!(parse_range_header("bytes=90-", 100), Some(90..100));
        assert_eq!(parse_range_header("bytes=-10", 100), Some(90..100));
        assert_eq!(parse_range_header("bytes=0-4,6-8", 100), None);
        assert_eq!(parse_range_header("items=0-4", 100), None);
    }
}
