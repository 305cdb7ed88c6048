//! Error types for resolving, fetching and pushing against the registry API
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`RegistryError`]. Failures reported by the registry API itself arrive as
//! [`ApiError`] and are propagated unchanged through [`RegistryError::Api`].

pub mod handlers;

use crate::digest::Digest;
use crate::registry::api::ApiError;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The reference string does not follow the registry reference grammar
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The operation needs a tag or digest but the reference carries neither
    #[error("reference object required")]
    ObjectRequired,

    /// Image or layer absent remotely
    #[error("not found: {0}")]
    NotFound(String),

    /// Push target already present remotely
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Resolved content violates what the caller asked for
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Media type with no fetch policy
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Error returned by the registry API, passed through as-is
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Download endpoint answered with a non-success status
    #[error("transport error: {0}")]
    Transport(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: String },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, RegistryError::AlreadyExists(_))
    }

    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, RegistryError::FailedPrecondition(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RegistryError::Cancelled)
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Transport(format!("invalid download url: {}", err))
    }
}
