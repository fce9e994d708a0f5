//! Path validation errors

use std::path::PathBuf;
use thiserror::Error;

/// Rejections from the path security boundary; never retried
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path contains a NUL byte")]
    NullByte,

    #[error("Path traversal detected: {path} escapes {base}")]
    Traversal { path: PathBuf, base: PathBuf },

    #[error("Symbolic link traversal detected: {path} resolves to {target} outside {base}")]
    SymlinkTraversal {
        path: PathBuf,
        target: PathBuf,
        base: PathBuf,
    },

    #[error("Alternate data stream access is not allowed: {path}")]
    AlternateDataStream { path: PathBuf },

    #[error("File {path} is {size} bytes, limit is {max} bytes")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PathError {
    /// Security rejections, as opposed to IO failures while probing
    pub fn is_security_violation(&self) -> bool {
        !matches!(self, PathError::Io(_) | PathError::FileTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traversal_message() {
        let err = PathError::Traversal {
            path: PathBuf::from("/etc/passwd"),
            base: PathBuf::from("/tmp/sandbox"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/passwd"));
        assert!(msg.contains("/tmp/sandbox"));
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_io_is_not_security() {
        let err = PathError::Io(std::io::Error::other("boom"));
        assert!(!err.is_security_violation());
    }
}
