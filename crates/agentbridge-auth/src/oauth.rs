//! OAuth2 client-credentials flow.
//!
//! Each call performs a fresh token exchange. Tokens are not cached, so every
//! outbound tool request costs one extra round trip to the token endpoint.

use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Client registration used for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Optional space separated scope list.
    pub scope: Option<String>,
}

impl OAuthClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: token_endpoint.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Build a config only when all three parts are present and non-empty.
    pub fn from_parts(
        client_id: Option<String>,
        client_secret: Option<String>,
        token_endpoint: Option<String>,
    ) -> Option<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Some(Self::new(
            non_empty(client_id)?,
            non_empty(client_secret)?,
            non_empty(token_endpoint)?,
        ))
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Client-credentials grant against a fixed token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    config: OAuthClientConfig,
    client: reqwest::Client,
}

impl ClientCredentials {
    pub fn new(config: OAuthClientConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: OAuthClientConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Exchange the client credentials for an access token.
    pub async fn fetch_token(&self) -> AuthResult<OAuthTokens> {
        let mut params = vec![("grant_type", "client_credentials")];
        if let Some(ref scope) = self.config.scope {
            params.push(("scope", scope.as_str()));
        }

        debug!(
            endpoint = %self.config.token_endpoint,
            client_id = %self.config.client_id,
            "Requesting client-credentials token"
        );

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::acquisition(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::acquisition(format!(
                "Token endpoint returned {status}: {text}"
            )));
        }

        let tokens: OAuthTokens = response
            .json()
            .await
            .map_err(|e| AuthError::acquisition(format!("Invalid token response: {e}")))?;

        if tokens.access_token.is_empty() {
            return Err(AuthError::acquisition("Token response has empty access_token"));
        }

        Ok(tokens)
    }
}
