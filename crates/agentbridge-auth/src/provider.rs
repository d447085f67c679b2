//! Credential strategy selection and per-request credential derivation.

use crate::error::{AuthError, AuthResult};
use crate::oauth::{ClientCredentials, OAuthClientConfig};
use crate::sigv4::{AwsCredentials, SigV4Signer};
use tracing::debug;
use url::Url;

/// Credential attached to one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// SigV4 headers, valid for exactly the request they were computed for.
    Signed(Vec<(String, String)>),
    /// OAuth2 access token.
    Bearer(String),
}

impl Credential {
    /// Headers to add to the outbound request.
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            Credential::Signed(headers) => headers.clone(),
            Credential::Bearer(token) => {
                vec![("authorization".to_string(), format!("Bearer {token}"))]
            }
        }
    }
}

/// Inputs for choosing a credential strategy.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    /// Local/dev mode: no credentials at all.
    pub local_mode: bool,
    /// Complete OAuth client registration, if configured.
    pub oauth: Option<OAuthClientConfig>,
    /// AWS credentials for request signing.
    pub aws: Option<AwsCredentials>,
    pub region: String,
    /// Signing service name, e.g. `lambda` or `bedrock-agentcore`.
    pub service: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            local_mode: false,
            oauth: None,
            aws: None,
            region: "us-east-1".to_string(),
            service: "lambda".to_string(),
        }
    }
}

/// The configured way of authenticating outbound tool requests.
#[derive(Debug, Clone)]
pub enum CredentialProvider {
    /// No credential (local development).
    None,
    /// AWS SigV4 request signing.
    Signing(SigV4Signer),
    /// OAuth2 client-credentials bearer token.
    OAuth(ClientCredentials),
}

impl CredentialProvider {
    /// Pick a strategy: local mode wins, then OAuth if fully configured,
    /// otherwise request signing.
    pub fn from_settings(settings: &CredentialSettings) -> AuthResult<Self> {
        if settings.local_mode {
            debug!("Local mode, outbound requests are unauthenticated");
            return Ok(Self::None);
        }

        if let Some(ref oauth) = settings.oauth {
            debug!(endpoint = %oauth.token_endpoint, "Using OAuth2 client credentials");
            return Ok(Self::OAuth(ClientCredentials::new(oauth.clone())));
        }

        let aws = settings.aws.clone().ok_or_else(|| {
            AuthError::MissingCredentials(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY are required for request signing"
                    .to_string(),
            )
        })?;
        debug!(
            region = %settings.region,
            service = %settings.service,
            "Using SigV4 request signing"
        );
        Ok(Self::Signing(SigV4Signer::new(
            aws,
            settings.region.clone(),
            settings.service.clone(),
        )))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Signing(_) => "sigv4",
            Self::OAuth(_) => "oauth2",
        }
    }

    /// Derive the credential for one request.
    ///
    /// Signing needs the exact method, URL, content type and body that will be
    /// sent. OAuth ignores them and performs a token exchange.
    pub async fn authorize(
        &self,
        method: &str,
        url: &Url,
        content_type: Option<&str>,
        body: &[u8],
    ) -> AuthResult<Option<Credential>> {
        match self {
            Self::None => Ok(None),
            Self::Signing(signer) => signer
                .sign(method, url, content_type, body)
                .map(|headers| Some(Credential::Signed(headers))),
            Self::OAuth(flow) => {
                let tokens = flow.fetch_token().await?;
                Ok(Some(Credential::Bearer(tokens.access_token)))
            }
        }
    }
}
