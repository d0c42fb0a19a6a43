//! Vidlift Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and constants
//! shared by the storage backends, the transfer coordinator, the API and the CLI.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, TransferSettings};
pub use error::{ErrorMetadata, LogLevel, TransferError, TransferResult};
pub use storage_types::StorageBackend;
