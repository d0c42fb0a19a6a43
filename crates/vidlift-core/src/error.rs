//! Error types module
//!
//! All failures of the transfer coordinator are unified under [`TransferError`]. Each
//! variant carries enough context (target name, session id, part index) for a caller to
//! retry deterministically. [`ErrorMetadata`] describes how a variant is presented over
//! HTTP and at which level it is logged.

use uuid::Uuid;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SESSION_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upload session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Part index {index} out of range for session {session_id} (expected 0..{expected})")]
    IndexOutOfRange {
        session_id: Uuid,
        index: u32,
        expected: u32,
    },

    #[error("Range {start}..{end} of {name} cannot be served ({available} bytes available)")]
    RangeUnsatisfiable {
        name: String,
        start: u64,
        end: u64,
        available: u64,
    },

    #[error("Upload of {target} is incomplete, missing parts {missing:?}")]
    IncompleteUpload { target: String, missing: Vec<u32> },

    #[error("Transfer of {target} failed at part {index}")]
    TransferFailed {
        target: String,
        index: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Session limit reached ({capacity} open sessions)")]
    SessionLimitExceeded { capacity: usize },

    #[error("Target {target} already has an open upload session {existing}")]
    SessionConflict { target: String, existing: Uuid },

    #[error("Invalid or expired signature: {0}")]
    SignatureInvalid(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for coordinator operations
pub type TransferResult<T> = Result<T, TransferError>;

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Internal(format!("IO error: {}", err))
    }
}

impl From<validator::ValidationErrors> for TransferError {
    fn from(err: validator::ValidationErrors) -> Self {
        TransferError::InvalidArgument(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn transfer_error_static_metadata(
    err: &TransferError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        TransferError::InvalidArgument(_) => (
            400,
            "INVALID_ARGUMENT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        TransferError::SessionNotFound(_) => (
            404,
            "SESSION_NOT_FOUND",
            false,
            Some("Start a new upload session"),
            false,
            LogLevel::Debug,
        ),
        TransferError::IndexOutOfRange { .. } => (
            400,
            "INDEX_OUT_OF_RANGE",
            false,
            Some("Part indices run from 0 to part_count - 1"),
            false,
            LogLevel::Debug,
        ),
        TransferError::RangeUnsatisfiable { .. } => (
            416,
            "RANGE_UNSATISFIABLE",
            false,
            Some("Probe the object size and request a range inside it"),
            false,
            LogLevel::Debug,
        ),
        TransferError::IncompleteUpload { .. } => (
            409,
            "INCOMPLETE_UPLOAD",
            true,
            Some("Upload the missing parts, then finalize again"),
            false,
            LogLevel::Debug,
        ),
        TransferError::TransferFailed { .. } => (
            502,
            "TRANSFER_FAILED",
            true,
            Some("Retry the transfer"),
            false,
            LogLevel::Warn,
        ),
        TransferError::SessionLimitExceeded { .. } => (
            429,
            "SESSION_LIMIT_EXCEEDED",
            true,
            Some("Wait for open uploads to finish and retry"),
            false,
            LogLevel::Warn,
        ),
        TransferError::SessionConflict { .. } => (
            409,
            "SESSION_CONFLICT",
            false,
            Some("Finalize or abort the existing session first"),
            false,
            LogLevel::Debug,
        ),
        TransferError::SignatureInvalid(_) => (
            403,
            "SIGNATURE_INVALID",
            false,
            Some("Request a fresh signed URL"),
            false,
            LogLevel::Debug,
        ),
        TransferError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the object name exists"),
            false,
            LogLevel::Debug,
        ),
        TransferError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        TransferError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl TransferError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            TransferError::InvalidArgument(_) => "InvalidArgument",
            TransferError::SessionNotFound(_) => "SessionNotFound",
            TransferError::IndexOutOfRange { .. } => "IndexOutOfRange",
            TransferError::RangeUnsatisfiable { .. } => "RangeUnsatisfiable",
            TransferError::IncompleteUpload { .. } => "IncompleteUpload",
            TransferError::TransferFailed { .. } => "TransferFailed",
            TransferError::SessionLimitExceeded { .. } => "SessionLimitExceeded",
            TransferError::SessionConflict { .. } => "SessionConflict",
            TransferError::SignatureInvalid(_) => "SignatureInvalid",
            TransferError::NotFound(_) => "NotFound",
            TransferError::Storage(_) => "Storage",
            TransferError::Internal(_) => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }

    /// Wrap a part-level failure into the job-level error naming the failing index.
    pub fn transfer_failed(target: impl Into<String>, index: u32, cause: TransferError) -> Self {
        TransferError::TransferFailed {
            target: target.into(),
            index,
            source: anyhow::Error::new(cause),
        }
    }
}

impl ErrorMetadata for TransferError {
    fn http_status_code(&self) -> u16 {
        transfer_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        transfer_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        transfer_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        transfer_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        transfer_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        transfer_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            TransferError::Storage(_) => "Failed to access object storage".to_string(),
            TransferError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}
