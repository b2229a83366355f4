use thiserror::Error;

/// Errors from repository operations (used by trait definitions in chowline-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A mandatory field is missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced user, merchant, order, or session does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller may not act on the referenced record.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Failure to push a frame to a user's live channel.
///
/// Never fails a send: the message is already persisted when this occurs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("user '{0}' has no live channel")]
    Offline(String),

    #[error("live channel for '{0}' is closed")]
    ChannelClosed(String),
}
