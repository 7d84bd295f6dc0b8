//! Error types for upstream validation

use std::time::Duration;
use thiserror::Error;

/// Main error type for the validation engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("secret \"{name}\" not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("Secret lookup error: {0}")]
    SecretLookup(String),

    /// Failure reported by, or while talking to, a directory server.
    /// Displayed verbatim because it ends up inside condition messages.
    #[error("{0}")]
    Directory(String),

    /// The directory server could not be reached
    #[error("error dialing host {address:?}: {detail}")]
    Dial { address: String, detail: String },

    /// The server was reached but rejected the service account
    #[error("error binding as {username:?}: {detail}")]
    Bind { username: String, detail: String },

    #[error("context deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("context canceled")]
    Cancelled,

    /// An entry attribute could not be parsed or failed a check
    #[error("{0}")]
    InvalidAttribute(String),

    /// At least one upstream asked to be evaluated again
    #[error("synthetic requeue requested")]
    Requeue,

    /// A CA bundle held no usable certificate
    #[error("no certificates found")]
    NoCertificates,

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Generic(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}
