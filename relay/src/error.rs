//! Error types for cipher-relay.
//!
//! Two failure domains, each handled locally: [`StoreError`] for the
//! offline queue, [`SessionError`] for one connection's transport.
//! Startup failures are fatal and reported through `anyhow` in the binary;
//! configuration errors live in [`ConfigError`](crate::config::ConfigError).

/// Offline store errors.
///
/// Any store failure is reported to the caller; it is never treated as
/// "message delivered".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A queued message could not be encoded or decoded.
    #[error("queued message codec failure for {user_id}: {source}")]
    Codec {
        /// User whose queue held the offending entry.
        user_id: String,
        /// Underlying wire error.
        #[source]
        source: relay_types::WireError,
    },

    /// The store is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-connection session errors.
///
/// These are always handled locally: the affected connection is closed and
/// the process continues serving other connections.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The initial handshake frame was missing, malformed, or late.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Why the handshake was rejected.
        reason: String,
    },

    /// Reading from the transport failed (peer disconnect, transport error).
    #[error("transport read failed: {0}")]
    Read(String),

    /// A subsequent frame was not a valid wire message.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] relay_types::WireError),

    /// The dispatch channel is closed; the relay is shutting down.
    #[error("dispatch queue closed")]
    DispatchClosed,
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
