//! Error types for wire encoding and validation.

/// Errors produced while encoding, decoding, or validating wire types.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// JSON encoding or decoding failed.
    #[error("invalid message encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// A user identifier was empty.
    #[error("user id must not be empty")]
    EmptyUserId,
}
