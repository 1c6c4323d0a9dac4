//! Security configuration error types.

use netlaunch_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while building a security policy.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A configured attribute check name is not recognised.
    #[error("unknown attribute check '{0}'")]
    UnknownAttributeCheck(String),

    /// A configured trusted publisher key does not decode.
    #[error("invalid trusted publisher '{entry}': {source}")]
    InvalidTrustedPublisher {
        /// The configured value.
        entry: String,
        /// Decoding failure.
        #[source]
        source: CryptoError,
    },

    /// The trusted publisher store could not be loaded.
    #[error("failed to load trust store: {0}")]
    TrustStore(#[from] CryptoError),
}

/// Result type for security policy construction.
pub type SecurityResult<T> = Result<T, SecurityError>;
