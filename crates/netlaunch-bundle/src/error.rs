//! Bundle archive error types.

use thiserror::Error;

use netlaunch_crypto::CryptoError;

/// Errors that can occur while reading or writing bundle archives.
#[derive(Debug, Error)]
pub enum BundleError {
    /// I/O failure on the bundle file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be decoded.
    #[error("archive error: {message}")]
    Archive {
        /// Error details.
        message: String,
    },

    /// An entry has a type other than regular file or directory.
    #[error("unsafe entry type {entry_type} at {path}")]
    UnsafeEntryType {
        /// The tar entry type.
        entry_type: String,
        /// Entry path.
        path: String,
    },

    /// An entry path escapes the archive root.
    #[error("path traversal detected in entry: {path}")]
    PathTraversal {
        /// The offending path.
        path: String,
    },

    /// The same path appears twice.
    #[error("duplicate entry: {path}")]
    DuplicateEntry {
        /// The repeated path.
        path: String,
    },

    /// An entry count or size limit was exceeded.
    #[error("archive limit exceeded: {message}")]
    LimitExceeded {
        /// Which limit and by how much.
        message: String,
    },

    /// The bundle index is malformed.
    #[error("invalid bundle index: {message}")]
    InvalidIndex {
        /// Parse failure detail.
        message: String,
    },

    /// Signing failed while building a bundle.
    #[error("signature block error: {message}")]
    SignatureBlock {
        /// Error details.
        message: String,
    },

    /// Cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl BundleError {
    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }
}

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;
