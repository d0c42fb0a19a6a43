//! Vidlift Storage Library
//!
//! Object-store abstraction for the transfer coordinator. The [`Storage`] trait covers
//! whole-object reads and writes, byte-range reads, listings, signed URLs and multipart
//! uploads. Backends:
//!
//! - [`S3Storage`]: any S3-compatible service through `aws-sdk-s3`
//! - [`LocalStorage`]: a directory on the local filesystem
//! - [`MemoryStorage`]: an in-process store, used by tests and the CLI
//!
//! Local and memory backends have no native URL signing, so their signed URLs point at the
//! coordinator's `/signed/{key}` endpoint and are verified with [`UrlSigner`].
//!
//! Keys must not be empty, contain `..` segments or start with `/`.

pub mod delete;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub(crate) mod multipart;
pub mod range;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use delete::delete_from_all;
pub use factory::{create_backend, create_storage_set, url_signer, StorageSet};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryStorage;
pub use range::{check_range, format_range_header, parse_range_header};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signing::{
    execute_signed_get, execute_signed_put, part_params, SignedRead, SignedRequest, UrlSigner,
    PART_NUMBER_PARAM, UPLOAD_ID_PARAM,
};
pub use traits::{Storage, StorageError, StorageResult};
pub use vidlift_core::StorageBackend;
