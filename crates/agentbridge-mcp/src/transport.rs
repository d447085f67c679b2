//! Client-side transport abstraction and helpers shared by the HTTP transports.

use crate::error::{McpError, McpResult};
use crate::protocol::{decode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message};
use agentbridge_auth::CredentialProvider;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for a response.
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Send a notification (no response expected).
    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()>;

    /// Close the transport.
    async fn close(&self) -> McpResult<()>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

pub(crate) const JSON: &str = "application/json";
pub(crate) const ACCEPT_JSON_OR_SSE: &str = "application/json, text/event-stream";

/// Build a JSON POST carrying credentials derived for exactly this body.
pub(crate) async fn authorized_post(
    client: &Client,
    url: &Url,
    credentials: &CredentialProvider,
    body: Vec<u8>,
) -> McpResult<reqwest::RequestBuilder> {
    let credential = credentials.authorize("POST", url, Some(JSON), &body).await?;

    let mut req = client
        .post(url.clone())
        .header(CONTENT_TYPE, JSON)
        .header(ACCEPT, ACCEPT_JSON_OR_SSE);
    if let Some(credential) = credential {
        for (name, value) in credential.headers() {
            req = req.header(name, value);
        }
    }
    Ok(req.body(body))
}

/// Map non-success HTTP statuses onto errors.
pub(crate) async fn check_status(response: reqwest::Response) -> McpResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(McpError::AuthRequired);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(McpError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn expect_response(message: Message) -> McpResult<JsonRpcResponse> {
    match message {
        Message::Response(response) => Ok(response),
        other => Err(McpError::malformed(format!(
            "expected a response frame, got {}",
            other.method().unwrap_or("unknown")
        ))),
    }
}

pub(crate) fn response_from_bytes(bytes: &[u8]) -> McpResult<JsonRpcResponse> {
    decode(bytes)
        .map_err(|e| McpError::malformed(e.to_string()))
        .and_then(expect_response)
}

pub(crate) fn response_from_value(value: Value) -> McpResult<JsonRpcResponse> {
    Message::from_value(value)
        .map_err(|e| McpError::malformed(e.to_string()))
        .and_then(expect_response)
}
