//! Error types for ef-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes
//! and classified as transient or permanent for the retry layer.

use thiserror::Error;

/// Result type alias for ef-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ef-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batch-level precondition failed (empty input, invalid target, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The Identity Provider refused or could not be reached
    #[error("Credential acquisition failed for {scope}: {message}")]
    CredentialAcquisition {
        scope: String,
        message: String,
        /// 5xx or timeout from the Identity Provider
        transient: bool,
    },

    /// Direct-access probe did not succeed; never surfaced to callers
    #[error("Probe inconclusive: {0}")]
    ProbeInconclusive(String),

    /// Neither a direct nor an HTTP link can be used
    #[error("No retrievable link: {0}")]
    NoRetrievableLink(String),

    /// A captured auth context could not be turned back into a session
    #[error("Rehydration failed: {0}")]
    Rehydration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Operation exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) | Error::Config(_) | Error::InvalidUrl(_) => 2, // UsageError
            Error::Network(_) | Error::Timeout(_) => 3,                          // NetworkError
            Error::Auth(_)
            | Error::CredentialAcquisition { .. }
            | Error::Rehydration(_) => 4, // AuthError
            Error::NotFound(_) | Error::NoRetrievableLink(_) => 5, // NotFound
            _ => 1,                                                // GeneralError
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) => true,
            Error::CredentialAcquisition { transient, .. } => *transient,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
