//! Vidlift Transfer Library
//!
//! The chunked transfer coordinator: splitting objects into parts, moving parts with
//! bounded parallelism under the proxied or direct strategy, and reassembling them into
//! a byte-identical object.
//!
//! - [`Coordinator`]: server-side session interface over a [`vidlift_storage::StorageSet`]
//! - [`TransferOrchestrator`]: client-side upload and download of whole files
//! - [`PartTransport`]: how a single part travels ([`ProxiedTransport`], [`DirectTransport`])
//! - [`ParallelBatcher`]: windowed, fail-fast parallel execution
//! - [`ChunkSessionStore`]: bounded-lifetime session bookkeeping

pub mod batcher;
pub mod coordinator;
pub mod orchestrator;
pub mod progress;
pub mod reassembler;
pub mod session;
pub mod signed_client;
pub mod splitter;
pub mod transport;

pub use batcher::ParallelBatcher;
pub use coordinator::{Coordinator, CoordinatorSettings};
pub use orchestrator::{TransferJob, TransferOrchestrator};
pub use progress::TransferProgress;
pub use session::ChunkSessionStore;
pub use signed_client::{LoopbackSignedUrlClient, ReqwestSignedUrlClient, SignedUrlClient};
pub use splitter::{part_count, plan_parts};
pub use transport::{DirectTransport, PartTransport, ProxiedTransport};
