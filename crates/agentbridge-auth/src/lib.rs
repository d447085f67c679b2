//! Outbound credentials for agentbridge.
//!
//! Two interchangeable strategies authenticate calls to remote tool runtimes:
//!
//! - **Request signing**: AWS SigV4, computed locally per request
//! - **Client credentials**: OAuth2 bearer token fetched from a token endpoint
//!
//! [`CredentialProvider::from_settings`] picks one from configuration.

pub mod error;
pub mod oauth;
pub mod provider;
pub mod sigv4;

pub use error::{AuthError, AuthResult};
pub use oauth::{ClientCredentials, OAuthClientConfig, OAuthTokens};
pub use provider::{Credential, CredentialProvider, CredentialSettings};
pub use sigv4::{AwsCredentials, SigV4Signer};
