use thiserror::Error;

use crate::tgi::Tgi;

/// Errors produced anywhere in this crate.
///
/// Every fallible public entry point returns `Result<T, Error>` so a caller can
/// match on the kind instead of parsing a message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid DBPF header: {0}")]
    InvalidHeader(String),

    #[error("unsupported compression format: {0}")]
    UnsupportedCompressionFormat(String),

    #[error("truncated input: expected at least {expected} bytes, found {found}")]
    TruncatedInput { expected: usize, found: usize },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("no entry found for {0:?}")]
    NotFound(Tgi),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal invariant violated: {0}")]
    LogicError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
