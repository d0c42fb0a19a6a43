//! Windowed parallel execution of per-part operations.
//!
//! Parts are processed in windows of `concurrency_limit` consecutive indices. Every
//! operation of a window is started together and the whole window settles before the
//! next one starts, so at most `concurrency_limit` operations are ever in flight. After
//! a window containing a failure no further window starts.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use vidlift_core::models::PartSpec;
use vidlift_core::{TransferError, TransferResult};

use crate::progress::TransferProgress;

#[derive(Debug, Clone)]
pub struct ParallelBatcher {
    concurrency_limit: usize,
    progress: Option<Arc<TransferProgress>>,
}

impl ParallelBatcher {
    pub fn new(concurrency_limit: usize) -> TransferResult<Self> {
        if concurrency_limit == 0 {
            return Err(TransferError::InvalidArgument(
                "Concurrency limit must be greater than 0".to_string(),
            ));
        }
        Ok(ParallelBatcher {
            concurrency_limit,
            progress: None,
        })
    }

    /// Count every successful operation in `progress`.
    pub fn with_progress(mut self, progress: Arc<TransferProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Run `op` for every part and return the results tagged with their index.
    ///
    /// Results come back in completion order. The first failure observed is returned as
    /// `TransferFailed` naming `target` and the failing index; results of siblings in
    /// the same window are discarded.
    pub async fn run<T, F, Fut>(
        &self,
        target: &str,
        parts: &[PartSpec],
        op: F,
    ) -> TransferResult<Vec<(u32, T)>>
    where
        F: Fn(PartSpec) -> Fut,
        Fut: Future<Output = TransferResult<T>>,
    {
        let mut results = Vec::with_capacity(parts.len());

        for (window_index, window) in parts.chunks(self.concurrency_limit).enumerate() {
            let mut in_flight: FuturesUnordered<_> = window
                .iter()
                .map(|spec| {
                    let spec = *spec;
                    let fut = op(spec);
                    async move { (spec, fut.await) }
                })
                .collect();

            let mut first_failure: Option<(u32, TransferError)> = None;
            while let Some((spec, result)) = in_flight.next().await {
                match result {
                    Ok(value) => {
                        if let Some(progress) = &self.progress {
                            progress.record(spec.len);
                        }
                        tracing::debug!(
                            target_name = %target,
                            index = spec.index,
                            size_bytes = spec.len,
                            "Part transferred"
                        );
                        results.push((spec.index, value));
                    }
                    Err(e) => {
                        tracing::warn!(
                            target_name = %target,
                            index = spec.index,
                            error = %e,
                            "Part transfer failed"
                        );
                        if first_failure.is_none() {
                            first_failure = Some((spec.index, e));
                        }
                    }
                }
            }

            if let Some((index, cause)) = first_failure {
                tracing::warn!(
                    target_name = %target,
                    window = window_index,
                    index = index,
                    "Stopping transfer after failed window"
                );
                return Err(TransferError::transfer_failed(target, index, cause));
            }
        }

        Ok(results)
    }
}
