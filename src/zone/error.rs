//! Zone registry error types

use std::path::PathBuf;

use thiserror::Error;

/// Zone discovery and reset errors
#[derive(Error, Debug)]
pub enum ZoneError {
    /// Zone root could not be enumerated
    #[error("cannot open zone directory {path}: {source}")]
    CannotOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configured zone root is not a directory
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Write-pointer reset did not take
    #[error("zone reset failed for {path}: {source}")]
    ResetFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for zone operations
pub type ZoneResult<T> = Result<T, ZoneError>;
