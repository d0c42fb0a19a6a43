//! Shared constants and defaults.

/// API version prefix for all coordinator routes.
pub const API_PREFIX: &str = "/api/v0";

/// Default part size (5 MiB, the smallest non-final part S3 accepts).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of parts in flight per window.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Upper bound on the number of parts in one object (S3 multipart limit).
pub const MAX_PART_COUNT: u32 = 10_000;

/// Largest single part accepted by the proxied path.
pub const DEFAULT_MAX_PART_SIZE: u64 = 64 * 1024 * 1024;

/// Maximum number of concurrently open upload sessions.
pub const DEFAULT_SESSION_CAPACITY: usize = 256;

/// Sessions idle for longer than this are swept.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Interval between background session sweeps.
pub const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Lifetime of signed URLs (15 minutes).
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 15 * 60;

/// Prefix under which proxied parts are staged until reassembly.
pub const STAGING_PREFIX: &str = "staging";

/// Content type used when the caller does not provide one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
