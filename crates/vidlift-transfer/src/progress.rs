//! Monotonic progress counters for a transfer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Completed-part counter shared between the batcher and whoever reports progress.
#[derive(Debug, Default)]
pub struct TransferProgress {
    total_parts: u32,
    completed_parts: AtomicU32,
    bytes_transferred: AtomicU64,
}

impl TransferProgress {
    pub fn new(total_parts: u32) -> Self {
        TransferProgress {
            total_parts,
            ..Default::default()
        }
    }

    /// Count one finished part of `bytes` bytes.
    pub fn record(&self, bytes: u64) {
        self.completed_parts.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn completed_parts(&self) -> u32 {
        self.completed_parts.load(Ordering::Relaxed)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_parts == 0 {
            return 0.0;
        }
        (self.completed_parts() as f64 / self.total_parts as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_parts_and_bytes() {
        let progress = TransferProgress::new(4);
        progress.record(10);
        progress.record(5);
        assert_eq!(progress.completed_parts(), 2);
        assert_eq!(progress.bytes_transferred(), 15);
        assert_eq!(progress.fraction(), 0.5);
    }
}
