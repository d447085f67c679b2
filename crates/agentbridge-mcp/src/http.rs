//! Streamable HTTP transport for remote MCP servers.
//!
//! Requests are sent as HTTP POST; the server answers with either a JSON body
//! or an SSE stream whose `data:` lines carry the response frame.

use crate::error::{McpError, McpResult};
use crate::protocol::{encode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message};
use crate::transport::{authorized_post, check_status, response_from_bytes, Transport};
use agentbridge_auth::CredentialProvider;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Session header used by stateful MCP servers.
const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// The MCP endpoint URL (e.g., `http://localhost:8002/mcp/`)
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 60,
        }
    }
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Streamable HTTP transport for remote MCP servers.
pub struct StreamableHttpTransport {
    url: Url,
    client: Client,
    credentials: CredentialProvider,
    connected: AtomicBool,
    /// Session ID assigned by a stateful server.
    session_id: RwLock<Option<String>>,
}

impl StreamableHttpTransport {
    /// Create a new transport. Credentials are derived again for every request.
    pub fn new(config: HttpTransportConfig, credentials: CredentialProvider) -> McpResult<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| McpError::connection_failed(format!("Invalid URL {}: {e}", config.url)))?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            url,
            client,
            credentials,
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn send(&self, body: Vec<u8>) -> McpResult<reqwest::Response> {
        let mut req = authorized_post(&self.client, &self.url, &self.credentials, body).await?;
        if let Some(ref id) = *self.session_id.read().await {
            req = req.header(SESSION_HEADER, id.as_str());
        }

        let response = req.send().await.map_err(McpError::from_send)?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(id.to_string());
        }

        check_status(response).await
    }

    /// Parse a JSON or SSE response body.
    async fn read_response(&self, response: reqwest::Response) -> McpResult<JsonRpcResponse> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            read_sse_response(response).await
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| McpError::protocol_error(format!("Failed to read response: {e}")))?;
            response_from_bytes(&bytes)
        }
    }
}

fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn frame_from_line(line: &str) -> Option<JsonRpcResponse> {
    sse_data(line).and_then(|data| response_from_bytes(data.as_bytes()).ok())
}

/// Byte buffer that yields complete SSE lines.
///
/// Network chunks may end in the middle of a multi-byte character, so bytes
/// are only decoded once the line terminator has arrived.
#[derive(Debug, Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator.
    fn next_line(&mut self) -> Option<McpResult<String>> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        Some(decode_line(&line))
    }

    /// Whatever is left once the stream has ended.
    fn finish(&mut self) -> Option<McpResult<String>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> McpResult<String> {
    std::str::from_utf8(bytes)
        .map(|line| line.trim_end().to_string())
        .map_err(|e| McpError::malformed(format!("SSE line is not valid UTF-8: {e}")))
}

/// Read SSE events until one carries a response frame.
async fn read_sse_response(response: reqwest::Response) -> McpResult<JsonRpcResponse> {
    let mut stream = response.bytes_stream();
    let mut lines = SseLines::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| McpError::protocol_error(format!("Stream error: {e}")))?;
        lines.push(&chunk);

        while let Some(line) = lines.next_line() {
            if let Some(response) = frame_from_line(&line?) {
                return Ok(response);
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(response) = frame_from_line(&line?) {
            return Ok(response);
        }
    }

    Err(McpError::malformed("SSE stream ended without response"))
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        debug!(id = %request.id, method = %request.method, url = %self.url, "Sending MCP request");

        let response = self.send(encode(&Message::Request(request))).await?;
        self.connected.store(true, Ordering::SeqCst);
        self.read_response(response).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        debug!(method = %notification.method, "Sending MCP notification");

        match self.send(encode(&Message::Notification(notification))).await {
            Ok(_) => Ok(()),
            Err(McpError::Upstream { status, .. }) => {
                warn!(status, "Notification returned non-success status");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&self) -> McpResult<()> {
        let session = self.session_id.write().await.take();
        if let Some(id) = session {
            let credential = self
                .credentials
                .authorize("DELETE", &self.url, None, b"")
                .await?;
            let mut req = self.client.delete(self.url.clone()).header(SESSION_HEADER, id);
            for (name, value) in credential.map(|c| c.headers()).unwrap_or_default() {
                req = req.header(name, value);
            }
            if let Err(e) = req.send().await {
                debug!(error = %e, "Session delete failed");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        debug!("Closed streamable HTTP transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
