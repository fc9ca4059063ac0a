//! Error types for manifest-publisher-github

use thiserror::Error;

/// Errors raised while setting up the HTTP clients
#[derive(Error, Debug)]
pub enum GitHubError {
    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// A credential cannot be sent as an HTTP header
    #[error("{0} contains characters not allowed in an HTTP header")]
    InvalidCredential(&'static str),
}

pub type Result<T> = std::result::Result<T, GitHubError>;
