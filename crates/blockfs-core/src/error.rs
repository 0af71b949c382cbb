use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::fd_table::Fd;

/// Errors that can occur during engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockfsError {
    /// Name lookup failed, or the file behind a handle is gone
    #[error("No such file: {0}")]
    NoSuchFile(String),

    /// Handle out of range or slot not occupied
    #[error("Invalid file descriptor: {0}")]
    InvalidDescriptor(Fd),

    /// Memory (or the configured block budget) ran out
    #[error("Allocation failure: {0}")]
    AllocationFailure(&'static str),

    /// No byte of the write fits under the file size limit
    #[error("File size limit of {limit} bytes reached")]
    SizeLimitExceeded { limit: usize },
}

impl BlockfsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BlockfsError::NoSuchFile(_) => ErrorCode::NoSuchFile,
            BlockfsError::InvalidDescriptor(_) => ErrorCode::InvalidDescriptor,
            BlockfsError::AllocationFailure(_) => ErrorCode::AllocationFailure,
            BlockfsError::SizeLimitExceeded { .. } => ErrorCode::SizeLimitExceeded,
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockfsError>;

/// Flat error code reported by [`crate::Engine::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    NoError,
    NoSuchFile,
    InvalidDescriptor,
    AllocationFailure,
    SizeLimitExceeded,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "no_error",
            ErrorCode::NoSuchFile => "no_such_file",
            ErrorCode::InvalidDescriptor => "invalid_descriptor",
            ErrorCode::AllocationFailure => "allocation_failure",
            ErrorCode::SizeLimitExceeded => "size_limit_exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
