//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from loading or decoding key material.
///
/// Per-token outcomes are never reported through this type; see `FailureReason`.
#[derive(Debug, Error)]
pub enum Error {
    /// Unable to parse or use a published key set.
    #[error("key set error: {0}")]
    KeySet(String),

    /// A single key could not be turned into verification material.
    #[error("unusable key: {0}")]
    Key(String),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<Error> for firegate_api::FiregateError {
    fn from(e: Error) -> Self {
        firegate_api::FiregateError::KeySet(e.to_string())
    }
}
