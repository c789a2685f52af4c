//! Unified error type.

use thiserror::Error;

use crate::status::Status;

/// The error type returned by thistle's fallible operations.
///
/// Registration-time variants (`InvalidPattern`, `UnknownAlias`,
/// `UnsupportedMethod`) are meant to abort startup. Dispatch-time variants
/// are turned into exactly one error response by the reporter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid routing pattern: {0}")]
    InvalidPattern(String),

    #[error("named route does not exist: {0}")]
    UnknownAlias(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid hive key: {0}")]
    InvalidKey(String),

    #[error("hive key {key} does not hold a {expected}")]
    ShapeMismatch { key: String, expected: &'static str },

    #[error("no routes specified")]
    NoRoutesRegistered,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("invalid class {0}")]
    UnknownClass(String),

    #[error("invalid method {0}")]
    UninvocableHandler(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

impl Error {
    /// The HTTP status an error response for this failure carries.
    pub fn status(&self) -> Status {
        match self {
            Self::UnsupportedMethod(_) => Status::NotImplemented,
            Self::Forbidden => Status::Forbidden,
            Self::NotFound => Status::NotFound,
            Self::MethodNotAllowed => Status::MethodNotAllowed,
            _ => Status::InternalServerError,
        }
    }

    /// Errors whose default report text is the `HTTP <code> (<verb> <path>)`
    /// summary rather than the error message.
    pub(crate) fn is_http(&self) -> bool {
        matches!(
            self,
            Self::Forbidden | Self::NotFound | Self::MethodNotAllowed
        )
    }
}
