// Error types for the state stream

use thiserror::Error;

use crate::cursor::CursorMode;

/// The main error type for state stream operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Cursor errors
    #[error("no data for that timestamp")]
    NoData,

    #[error("computation is not ready")]
    NotReady,

    #[error("cursor is already initialized")]
    AlreadyInitialized,

    #[error("operation is not supported by a {0} cursor")]
    WrongMode(CursorMode),

    #[error("cannot write an entry before the last recorded change")]
    OutOfOrder,

    #[error("invalid cursor state: {0}")]
    InvalidState(String),

    // Storage errors
    #[error("storage backend violation: {0}")]
    BackendViolation(String),

    #[error("storage backend error: {0}")]
    Storage(String),

    // Delta engine errors
    #[error("delta engine failure: {0}")]
    Delta(String),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Synchronization errors
    #[error("lock error: {0}")]
    Lock(String),
}

/// A convenience `Result` alias using the stream [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;
