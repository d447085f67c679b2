//! Error types for credential operations.

use thiserror::Error;

/// Errors that can occur while producing outbound credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint rejected the request or returned an unusable body.
    #[error("Credential acquisition failed: {0}")]
    CredentialAcquisitionFailed(String),

    /// Required credential material is not configured.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The request could not be signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The target URL is not usable for signing.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Create a credential acquisition error.
    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::CredentialAcquisitionFailed(message.into())
    }

    /// Create a signing error.
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing(message.into())
    }
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;
