//! VFS error types

use thiserror::Error;

use crate::zone::ZoneError;

/// Errors surfaced through the backend-plugin interface
#[derive(Error, Debug)]
pub enum VfsError {
    /// IO error from the host backend, surfaced unchanged
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffered write would leave a hole in the WAL image
    #[error("write at offset {offset} past logical size {size}")]
    WriteGap { offset: u64, size: u64 },

    /// No free zone left for a new WAL
    #[error("zone namespace exhausted: no free zone available")]
    ZonesExhausted,

    /// Zone registry or reset error
    #[error("zone error: {0}")]
    Zone(#[from] ZoneError),

    /// Optional method the backend does not implement
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// API misuse by the caller
    #[error("misuse: {0}")]
    Misuse(&'static str),
}

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;
