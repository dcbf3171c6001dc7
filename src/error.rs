//! Error types for ArborDB
//!
//! Provides a unified error type for all operations, plus a stable
//! numeric code for each kind so callers that speak in integer status codes
//! can map back and forth without losing unknown codes.

use thiserror::Error;

/// Result type alias using ArborError
pub type Result<T> = std::result::Result<T, ArborError>;

/// Unified error type for ArborDB operations
#[derive(Debug, Error)]
pub enum ArborError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data Integrity Errors
    // -------------------------------------------------------------------------
    /// Checksum mismatch or structurally invalid block. Scoped to the read
    /// that hit it; other keys stay readable.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Foreign Codes
    // -------------------------------------------------------------------------
    /// A numeric status this build does not know about.
    #[error("unknown error {0}")]
    Unknown(i32),
}

// =============================================================================
// Numeric Codes
// =============================================================================

pub const CODE_IO: i32 = 1;
pub const CODE_INVALID_ARGUMENT: i32 = 2;
pub const CODE_CORRUPTION: i32 = 3;
pub const CODE_NOT_FOUND: i32 = 4;
pub const CODE_INVALID_STATE: i32 = 5;
pub const CODE_SERIALIZATION: i32 = 6;
pub const CODE_CONFIG: i32 = 7;

impl ArborError {
    /// Stable numeric code for this error. Zero is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ArborError::Io(_) => CODE_IO,
            ArborError::InvalidArgument(_) => CODE_INVALID_ARGUMENT,
            ArborError::Corruption(_) => CODE_CORRUPTION,
            ArborError::NotFound => CODE_NOT_FOUND,
            ArborError::InvalidState(_) => CODE_INVALID_STATE,
            ArborError::Serialization(_) => CODE_SERIALIZATION,
            ArborError::Config(_) => CODE_CONFIG,
            ArborError::Unknown(code) => *code,
        }
    }

    /// Rebuild an error from a numeric code.
    ///
    /// Returns `None` for `0` (success). Codes this build does not recognize
    /// come back as [`ArborError::Unknown`].
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            0 => return None,
            CODE_IO => ArborError::Io(std::io::Error::other("operation failed")),
            CODE_INVALID_ARGUMENT => {
                ArborError::InvalidArgument("invalid args for operation".to_string())
            }
            CODE_CORRUPTION => ArborError::Corruption("corrupted data".to_string()),
            CODE_NOT_FOUND => ArborError::NotFound,
            CODE_INVALID_STATE => ArborError::InvalidState("invalid handle state".to_string()),
            CODE_SERIALIZATION => ArborError::Serialization("encoding failed".to_string()),
            CODE_CONFIG => ArborError::Config("invalid configuration".to_string()),
            other => ArborError::Unknown(other),
        };
        Some(err)
    }

    /// True for the expected "no such key" outcome of a read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArborError::NotFound)
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, ArborError::Corruption(_))
    }
}

impl From<bincode::Error> for ArborError {
    fn from(err: bincode::Error) -> Self {
        ArborError::Serialization(err.to_string())
    }
}
