//! Error types for tfsdk

use crate::diag::Diagnostics;

/// Error type for tfsdk operations.
///
/// Two failure channels share this type: transport failures (anything the
/// orchestrator treats as an RPC error) and the `Diagnostics` variant,
/// which the engine peels off and returns in the response body instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sentinel returned from `Resource::read` when the remote object is
    /// gone. The engine answers with a null state so the orchestrator
    /// plans a recreate.
    #[error("resource does not exist")]
    DoesNotExist,

    /// User-visible problems, routed onto the response body.
    #[error("{0}")]
    Diagnostics(Diagnostics),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("decoding error: {0}")]
    Decode(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("path error: {0}")]
    Path(String),

    #[error("invalid field tag: {0}")]
    InvalidTag(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("attempting to update {0} with no Update implementation")]
    MissingUpdate(String),

    #[error("{0}")]
    Custom(String),
}

/// Result type alias for tfsdk operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}
