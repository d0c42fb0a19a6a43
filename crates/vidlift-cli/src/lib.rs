//! In-process transfer tooling shared by the `vidlift` binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use vidlift_core::models::TransferStrategy;
use vidlift_core::StorageBackend;
use vidlift_transfer::{
    Coordinator, DirectTransport, LoopbackSignedUrlClient, ReqwestSignedUrlClient,
    TransferOrchestrator,
};

/// Timeout applied to each signed-URL request against S3.
const SIGNED_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Orchestrator for `strategy` over the coordinator's primary backend.
///
/// Direct transfers against S3 go over HTTP to the presigned URLs. Local and memory
/// backends have no external signed-URL server in a CLI process, so their signed URLs
/// are verified and executed in-process.
pub fn orchestrator_for(
    coordinator: &Coordinator,
    strategy: TransferStrategy,
) -> anyhow::Result<TransferOrchestrator> {
    match strategy {
        TransferStrategy::Proxied => Ok(TransferOrchestrator::proxied(coordinator.clone())),
        TransferStrategy::Direct => match coordinator.storage().backend_type() {
            StorageBackend::S3 => {
                // Part URLs must stay valid for as long as a part request may run
                let client = ReqwestSignedUrlClient::new(SIGNED_REQUEST_TIMEOUT)?;
                let transport = DirectTransport::new(coordinator.clone(), Arc::new(client))
                    .with_expiry(SIGNED_REQUEST_TIMEOUT);
                Ok(TransferOrchestrator::new(
                    coordinator.clone(),
                    Arc::new(transport),
                ))
            }
            StorageBackend::Local | StorageBackend::Memory => {
                let client = LoopbackSignedUrlClient::new(
                    coordinator.storage().clone(),
                    coordinator.signer().clone(),
                );
                Ok(TransferOrchestrator::direct(
                    coordinator.clone(),
                    Arc::new(client),
                ))
            }
        },
    }
}

/// Whole file in one part, or split into `chunk_size` parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Single,
    Chunked,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Single => "single",
            TransferMode::Chunked => "chunked",
        }
    }
}

/// Timings of one upload + download round trip.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub strategy: TransferStrategy,
    pub mode: TransferMode,
    pub part_count: u32,
    pub upload_ms: f64,
    pub download_ms: f64,
    pub upload_mib_per_sec: f64,
    pub download_mib_per_sec: f64,
    pub identical: bool,
}

fn mib_per_sec(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / secs
}

/// Round-trip `file` under every strategy and mode and report the timings.
///
/// Each run uses its own object under `name_prefix`, deleted once measured.
pub async fn compare_strategies(
    coordinator: &Coordinator,
    file: Bytes,
    name_prefix: &str,
    chunk_size: u64,
    concurrency_limit: usize,
) -> anyhow::Result<Vec<ComparisonRow>> {
    let prefix = name_prefix.trim_end_matches('/');
    let mut rows = Vec::new();

    for strategy in [TransferStrategy::Proxied, TransferStrategy::Direct] {
        let orchestrator = orchestrator_for(coordinator, strategy)?;
        for mode in [TransferMode::Single, TransferMode::Chunked] {
            let name = format!("{}/{}-{}", prefix, strategy, mode.as_str());
            let (chunk, concurrency) = match mode {
                TransferMode::Single => ((file.len() as u64).max(1), 1),
                TransferMode::Chunked => (chunk_size, concurrency_limit),
            };

            let upload = orchestrator
                .upload_file(&name, file.clone(), chunk, concurrency)
                .await
                .with_context(|| format!("{} {} upload failed", strategy, mode.as_str()))?;
            let (data, download) = orchestrator
                .download_file_timed(&name, chunk, concurrency)
                .await
                .with_context(|| format!("{} {} download failed", strategy, mode.as_str()))?;

            let report = coordinator.delete_object(&name).await?;
            if !report.is_success() {
                tracing::warn!(name = %name, "Failed to remove comparison object from every backend");
            }

            rows.push(ComparisonRow {
                strategy,
                mode,
                part_count: upload.part_count,
                upload_ms: upload.duration.as_secs_f64() * 1000.0,
                download_ms: download.duration.as_secs_f64() * 1000.0,
                upload_mib_per_sec: mib_per_sec(upload.bytes_transferred, upload.duration),
                download_mib_per_sec: mib_per_sec(download.bytes_transferred, download.duration),
                identical: data == file,
            });
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlift_storage::{MemoryStorage, StorageSet, UrlSigner};
    use vidlift_transfer::{ChunkSessionStore, CoordinatorSettings};

    fn memory_coordinator() -> Coordinator {
        let signer = UrlSigner::new(
            "cli-tests-secret-cli-tests-secret-cli",
            "http://localhost:4000/api/v0",
        );
        let storage = StorageSet {
            primary: Arc::new(MemoryStorage::new(signer.clone())),
            mirrors: Vec::new(),
            signer,
        };
        Coordinator::new(
            storage,
            ChunkSessionStore::new(8, Duration::from_secs(60)),
            CoordinatorSettings {
                default_chunk_size: 1024,
                max_part_count: 10_000,
                max_part_size: 1024 * 1024,
                presign_expiry: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn mib_per_sec_handles_zero_duration() {
        assert_eq!(mib_per_sec(1024, Duration::ZERO), 0.0);
        assert_eq!(mib_per_sec(1024 * 1024, Duration::from_secs(2)), 0.5);
    }

    #[tokio::test]
    async fn compare_covers_every_strategy_and_mode() {
        let coordinator = memory_coordinator();
        let file = Bytes::from(vec![7u8; 5_000]);

        let rows = compare_strategies(&coordinator, file, "bench", 1_024, 3)
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| row.identical));
        let chunked: Vec<_> = rows
            .iter()
            .filter(|row| row.mode == TransferMode::Chunked)
            .collect();
        assert!(chunked.iter().all(|row| row.part_count == 5));
        assert!(coordinator.list_objects("").await.unwrap().is_empty());
    }
}
