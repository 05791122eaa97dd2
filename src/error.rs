//! Error types for meshstats

use std::fmt;

/// Result type alias for meshstats operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for meshstats
#[derive(Debug)]
pub enum Error {
    /// Configuration JSON could not be parsed
    Json(serde_json::Error),
    /// Configuration errors
    Config(String),
    /// Expression compilation or evaluation failure
    Expression(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Expression(msg) => write!(f, "Expression error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
