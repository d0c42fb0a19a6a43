//! Vidlift CLI: chunked uploads and downloads against the configured storage backend.
//!
//! Storage settings come from the environment (`STORAGE_BACKEND`, `S3_BUCKET`,
//! `LOCAL_STORAGE_PATH`, ...). The coordinator runs in-process.

use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use vidlift_cli::{compare_strategies, init_tracing, orchestrator_for, print_json};
use vidlift_core::models::TransferStrategy;
use vidlift_core::{Config, StorageBackend};
use vidlift_storage::create_storage_set;
use vidlift_transfer::Coordinator;

#[derive(Parser)]
#[command(name = "vidlift", about = "Chunked video transfer CLI")]
struct Cli {
    /// Override STORAGE_BACKEND: s3, local or memory
    #[arg(long, global = true)]
    backend: Option<StorageBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct TransferArgs {
    /// proxied or direct
    #[arg(long, default_value = "proxied")]
    strategy: TransferStrategy,
    /// Part size in bytes (CHUNK_SIZE_BYTES when omitted)
    #[arg(long)]
    chunk_size: Option<u64>,
    /// Parts in flight per window (TRANSFER_CONCURRENCY when omitted)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Move the whole file as a single part
    #[arg(long, conflicts_with = "chunk_size")]
    single: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Object name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Download an object to a local file
    Download {
        /// Object name
        name: String,
        /// Destination path
        output: PathBuf,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// List stored objects on every configured backend
    List {
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Delete an object from every configured backend
    Delete {
        /// Object name
        name: String,
    },
    /// Round-trip a file under both strategies, single-shot and chunked, and report timings
    Compare {
        /// Path to the file to transfer
        file: PathBuf,
        /// Prefix for the temporary objects
        #[arg(long, default_value = "vidlift-compare")]
        prefix: String,
        /// Part size in bytes for the chunked runs
        #[arg(long)]
        chunk_size: Option<u64>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

fn object_name(file: &std::path::Path, name: Option<String>) -> anyhow::Result<String> {
    match name {
        Some(name) => Ok(name),
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("Cannot derive an object name from the path; pass --name"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.0.storage_backend = backend;
        config.0.mirror_backends.retain(|mirror| *mirror != backend);
        config.validate()?;
    }

    let storage = create_storage_set(&config)
        .await
        .context("Failed to initialize storage")?;
    let coordinator = Coordinator::from_config(&config, storage);
    let default_chunk = config.chunk_size_bytes();
    let default_concurrency = config.concurrency_limit();

    match cli.command {
        Commands::Upload {
            file,
            name,
            transfer,
        } => {
            let name = object_name(&file, name)?;
            let orchestrator = orchestrator_for(&coordinator, transfer.strategy)?;
            let outcome = if transfer.single {
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                orchestrator.upload_single_shot(&name, Bytes::from(data)).await?
            } else {
                orchestrator
                    .upload_path(
                        &name,
                        &file,
                        transfer.chunk_size.unwrap_or(default_chunk),
                        transfer.concurrency.unwrap_or(default_concurrency),
                    )
                    .await?
            };
            print_json(&outcome)?;
        }
        Commands::Download {
            name,
            output,
            transfer,
        } => {
            let orchestrator = orchestrator_for(&coordinator, transfer.strategy)?;
            let (chunk_size, concurrency) = if transfer.single {
                let size = coordinator.object_size(&name).await?;
                (size.max(1), 1)
            } else {
                (
                    transfer.chunk_size.unwrap_or(default_chunk),
                    transfer.concurrency.unwrap_or(default_concurrency),
                )
            };
            let outcome = orchestrator
                .download_to_path(&name, &output, chunk_size, concurrency)
                .await?;
            print_json(&outcome)?;
        }
        Commands::List { prefix } => {
            let objects = coordinator.list_objects(&prefix).await?;
            print_json(&objects)?;
        }
        Commands::Delete { name } => {
            let report = coordinator.delete_object(&name).await?;
            print_json(&report)?;
            if !report.is_success() {
                anyhow::bail!("Delete of {} failed on {} backend(s)", name, report.failed.len());
            }
        }
        Commands::Compare {
            file,
            prefix,
            chunk_size,
            concurrency,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let rows = compare_strategies(
                &coordinator,
                Bytes::from(data),
                &prefix,
                chunk_size.unwrap_or(default_chunk),
                concurrency.unwrap_or(default_concurrency),
            )
            .await?;
            print_json(&rows)?;
        }
    }

    Ok(())
}
