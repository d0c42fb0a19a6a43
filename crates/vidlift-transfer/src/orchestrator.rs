//! Client-side driver for chunked uploads and downloads.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use vidlift_core::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY_LIMIT};
use vidlift_core::models::{Part, TransferOutcome, TransferStrategy};
use vidlift_core::{TransferError, TransferResult};

use crate::batcher::ParallelBatcher;
use crate::coordinator::Coordinator;
use crate::progress::TransferProgress;
use crate::reassembler;
use crate::signed_client::SignedUrlClient;
use crate::splitter::plan_parts;
use crate::transport::{DirectTransport, PartTransport, ProxiedTransport};

/// One upload, created per transfer and dropped once it settles.
pub struct TransferJob {
    pub target_name: String,
    pub file: Bytes,
    pub chunk_size: u64,
    pub concurrency_limit: usize,
    pub progress: Arc<TransferProgress>,
}

impl TransferJob {
    pub fn new(
        target_name: impl Into<String>,
        file: Bytes,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<Self> {
        let target_name = target_name.into();
        if target_name.trim().is_empty() {
            return Err(TransferError::InvalidArgument(
                "Target name must not be empty".to_string(),
            ));
        }
        let parts = plan_parts(file.len() as u64, chunk_size)?;
        ParallelBatcher::new(concurrency_limit)?;

        Ok(TransferJob {
            target_name,
            file,
            chunk_size,
            concurrency_limit,
            progress: Arc::new(TransferProgress::new(parts.len() as u32)),
        })
    }

    /// Job with the default 5 MiB chunk size and 3 parts in flight.
    pub fn with_defaults(target_name: impl Into<String>, file: Bytes) -> TransferResult<Self> {
        Self::new(target_name, file, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY_LIMIT)
    }
}

#[derive(Clone)]
pub struct TransferOrchestrator {
    coordinator: Coordinator,
    transport: Arc<dyn PartTransport>,
}

impl TransferOrchestrator {
    pub fn new(coordinator: Coordinator, transport: Arc<dyn PartTransport>) -> Self {
        TransferOrchestrator {
            coordinator,
            transport,
        }
    }

    pub fn proxied(coordinator: Coordinator) -> Self {
        let transport = Arc::new(ProxiedTransport::new(coordinator.clone()));
        Self::new(coordinator, transport)
    }

    pub fn direct(coordinator: Coordinator, client: Arc<dyn SignedUrlClient>) -> Self {
        let transport = Arc::new(DirectTransport::new(coordinator.clone(), client));
        Self::new(coordinator, transport)
    }

    pub fn strategy(&self) -> TransferStrategy {
        self.transport.strategy()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub async fn upload_file(
        &self,
        target_name: &str,
        file: Bytes,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<TransferOutcome> {
        let job = TransferJob::new(target_name, file, chunk_size, concurrency_limit)?;
        self.run_upload(job).await
    }

    /// Upload a job: open a session, move every part, finalize.
    ///
    /// Any failure aborts the session so no partial object or staged part remains.
    pub async fn run_upload(&self, job: TransferJob) -> TransferResult<TransferOutcome> {
        let start = Instant::now();
        let parts = plan_parts(job.file.len() as u64, job.chunk_size)?;
        let strategy = self.strategy();

        let ticket = self
            .coordinator
            .initiate_session(&job.target_name, parts.len() as u32, strategy)
            .await?;

        let batcher =
            ParallelBatcher::new(job.concurrency_limit)?.with_progress(job.progress.clone());
        let transport = &self.transport;
        let file = &job.file;
        let ticket_ref = &ticket;

        let result = batcher
            .run(&job.target_name, &parts, |spec| {
                let payload = file.slice(spec.offset as usize..(spec.offset + spec.len) as usize);
                async move { transport.upload_part(ticket_ref, spec.index, payload).await }
            })
            .await;

        let finalized = match result {
            Ok(_) => self.coordinator.finalize(ticket.session_id).await,
            Err(e) => Err(e),
        };

        let finalized = match finalized {
            Ok(finalized) => finalized,
            Err(e) => {
                if let Err(abort_err) = self.coordinator.abort(ticket.session_id).await {
                    tracing::warn!(
                        error = %abort_err,
                        session_id = %ticket.session_id,
                        "Failed to abort upload session"
                    );
                }
                return Err(e);
            }
        };

        // A size mismatch removes the object so no corrupt target stays visible
        let stored = self.coordinator.object_size(&job.target_name).await?;
        let expected = job.file.len() as u64;
        if stored != expected || finalized.size != expected {
            if let Err(e) = self
                .coordinator
                .storage()
                .delete_object(&job.target_name)
                .await
            {
                tracing::warn!(
                    error = %e,
                    target = %job.target_name,
                    "Failed to delete mis-sized object"
                );
            }
            return Err(TransferError::Internal(format!(
                "Stored {} is {} bytes, uploaded {}",
                job.target_name, stored, expected
            )));
        }

        let outcome = TransferOutcome {
            target_name: job.target_name,
            strategy,
            duration: start.elapsed(),
            bytes_transferred: expected,
            part_count: parts.len() as u32,
        };

        tracing::info!(
            target = %outcome.target_name,
            strategy = %strategy,
            parts = outcome.part_count,
            size_bytes = outcome.bytes_transferred,
            duration_ms = outcome.duration.as_secs_f64() * 1000.0,
            "Upload complete"
        );

        Ok(outcome)
    }

    pub async fn download_file(
        &self,
        name: &str,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<Bytes> {
        Ok(self
            .download_file_timed(name, chunk_size, concurrency_limit)
            .await?
            .0)
    }

    /// Download `name` in ranged parts and reassemble it in index order.
    pub async fn download_file_timed(
        &self,
        name: &str,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<(Bytes, TransferOutcome)> {
        let start = Instant::now();
        let batcher = ParallelBatcher::new(concurrency_limit)?;
        let size = self.coordinator.object_size(name).await?;
        let parts = plan_parts(size, chunk_size)?;

        let transport = &self.transport;
        let fetched = batcher
            .run(name, &parts, |spec| async move {
                transport
                    .download_part(name, spec.index, spec.range())
                    .await
            })
            .await?;

        let data = reassembler::assemble(
            name,
            fetched
                .into_iter()
                .map(|(index, payload)| Part::new(index, payload))
                .collect(),
            parts.len() as u32,
            size,
        )?;

        let outcome = TransferOutcome {
            target_name: name.to_string(),
            strategy: self.strategy(),
            duration: start.elapsed(),
            bytes_transferred: size,
            part_count: parts.len() as u32,
        };

        tracing::info!(
            target = %name,
            strategy = %outcome.strategy,
            parts = outcome.part_count,
            size_bytes = size,
            duration_ms = outcome.duration.as_secs_f64() * 1000.0,
            "Download complete"
        );

        Ok((data, outcome))
    }

    /// Upload the whole file as a single part.
    pub async fn upload_single_shot(
        &self,
        target_name: &str,
        file: Bytes,
    ) -> TransferResult<TransferOutcome> {
        let chunk_size = (file.len() as u64).max(1);
        self.upload_file(target_name, file, chunk_size, 1).await
    }

    /// Download the whole object as a single part.
    pub async fn download_single_shot(&self, name: &str) -> TransferResult<Bytes> {
        let size = self.coordinator.object_size(name).await?;
        self.download_file(name, size.max(1), 1).await
    }

    pub async fn upload_path(
        &self,
        target_name: &str,
        path: &Path,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<TransferOutcome> {
        let file = tokio::fs::read(path).await?;
        self.upload_file(target_name, Bytes::from(file), chunk_size, concurrency_limit)
            .await
    }

    pub async fn download_to_path(
        &self,
        name: &str,
        path: &Path,
        chunk_size: u64,
        concurrency_limit: usize,
    ) -> TransferResult<TransferOutcome> {
        let (data, outcome) = self
            .download_file_timed(name, chunk_size, concurrency_limit)
            .await?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, &data).await?;
        Ok(outcome)
    }
}
