//! Transport for MCP engines hosted behind a serverless invocation URL.
//!
//! The remote function answers with an envelope `{statusCode, headers, body}`
//! whose `body` holds the JSON-RPC response frame.

use crate::error::{McpError, McpResult};
use crate::protocol::{encode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message};
use crate::transport::{
    authorized_post, check_status, response_from_bytes, response_from_value, Transport,
};
use agentbridge_auth::CredentialProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Invocation transport for serverless MCP engines.
pub struct InvocationTransport {
    url: Url,
    client: Client,
    credentials: CredentialProvider,
    connected: AtomicBool,
}

impl InvocationTransport {
    pub fn new(
        url: &str,
        credentials: CredentialProvider,
        timeout: Duration,
    ) -> McpResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| McpError::connection_failed(format!("Invalid URL {url}: {e}")))?;
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            url,
            client,
            credentials,
            connected: AtomicBool::new(false),
        })
    }

    async fn invoke(&self, message: &Message) -> McpResult<Value> {
        let response = authorized_post(&self.client, &self.url, &self.credentials, encode(message))
            .await?
            .send()
            .await
            .map_err(McpError::from_send)?;
        let response = check_status(response).await?;
        self.connected.store(true, Ordering::SeqCst);

        response
            .json()
            .await
            .map_err(|e| McpError::malformed(format!("Envelope is not JSON: {e}")))
    }
}

/// Pull the response frame out of an invocation envelope.
fn unwrap_envelope(envelope: Value) -> McpResult<JsonRpcResponse> {
    let mut map = match envelope {
        Value::Object(map) => map,
        other => {
            return Err(McpError::malformed(format!(
                "Unexpected response format: {other}"
            )))
        }
    };
    match map.remove("body") {
        Some(Value::String(body)) => response_from_bytes(body.as_bytes()),
        Some(body @ Value::Object(_)) => response_from_value(body),
        _ => Err(McpError::malformed(format!(
            "Unexpected response format: {}",
            Value::Object(map)
        ))),
    }
}

#[async_trait]
impl Transport for InvocationTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        debug!(
            id = %request.id,
            method = %request.method,
            url = %self.url,
            "Invoking remote MCP engine"
        );
        let envelope = self.invoke(&Message::Request(request)).await?;
        unwrap_envelope(envelope)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        debug!(method = %notification.method, "Invoking remote MCP engine with notification");
        self.invoke(&Message::Notification(notification)).await?;
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
