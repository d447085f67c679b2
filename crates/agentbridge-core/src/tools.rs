//! Builds the tool client an agent uses to reach its remote tools.

use crate::config::{AgentConfig, ToolTransport};
use crate::error::AgentResult;
use agentbridge_auth::CredentialProvider;
use agentbridge_mcp::{
    HttpTransportConfig, InvocationTransport, StreamableHttpTransport, ToolClient,
};
use std::time::Duration;
use tracing::info;

/// Create a [`ToolClient`] for the configured endpoint.
///
/// No network traffic happens here. Credentials are derived per request by
/// the transport, so an OAuth token endpoint is first contacted on the first
/// tool call.
pub fn build_tool_client(config: &AgentConfig) -> AgentResult<ToolClient> {
    let (url, transport) = config.tool_endpoint()?;
    let credentials = CredentialProvider::from_settings(&config.credential_settings())?;

    info!(
        url = %url,
        transport = ?transport,
        credentials = credentials.kind(),
        "Configuring tool client"
    );

    let client = match transport {
        ToolTransport::Streamable => {
            let http = HttpTransportConfig {
                url,
                timeout_secs: config.request_timeout_secs,
            };
            ToolClient::new(StreamableHttpTransport::new(http, credentials)?)
        }
        ToolTransport::Invocation => ToolClient::new(InvocationTransport::new(
            &url,
            credentials,
            Duration::from_secs(config.request_timeout_secs),
        )?),
    };

    Ok(client)
}
