//! Error taxonomy for the memo engine.
//!
//! Callers need to distinguish "nothing found" from "bad input" from
//! "system trouble", so every failure class gets its own variant rather
//! than an opaque error chain.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A get/update/delete referenced a document id that does not exist.
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// Out-of-range limit or score, or a malformed filter combination.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The resolved database path is unusable (directory cannot be
    /// created, file cannot be opened).
    #[error("database connection failed: {0}")]
    Connection(String),

    /// The upstream embedding provider failed. No retry is performed
    /// here; retry policy belongs to the adapter layer.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// Some, but not all, query angles failed during context assembly.
    /// Non-fatal: assembly proceeds with the surviving angles.
    #[error("{failed} of {total} query angles failed")]
    PartialFailure { failed: usize, total: usize },

    /// Every query angle failed during context assembly.
    #[error("all {total} query angles failed")]
    AllAnglesFailed { total: usize },

    /// The caller-supplied deadline expired before the operation completed.
    #[error("deadline expired before the operation completed")]
    DeadlineExpired,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
