//! MCP tool client.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    ListToolsResult, RequestId, ToolCallResult, ToolDescriptor,
};
use crate::transport::Transport;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Client for one remote MCP endpoint.
///
/// The client holds no connection state of its own; every call is one
/// request/response exchange over the transport.
#[derive(Clone)]
pub struct ToolClient {
    transport: Arc<dyn Transport>,
    /// Request ID counter.
    next_id: Arc<AtomicI64>,
}

impl ToolClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_transport(Arc::new(transport))
    }

    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Get the next request ID.
    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Perform the `initialize` handshake. Only stateful servers need this.
    pub async fn connect(&self) -> McpResult<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.call("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::malformed(format!("Invalid initialize result: {e}")))?;

        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        info!(
            server = %init.server_info.name,
            protocol = %init.protocol_version,
            "Connected to MCP server"
        );
        Ok(init)
    }

    /// List the remote tools.
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let result = self.call("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| McpError::malformed(format!("Invalid tools/list result: {e}")))?;
        debug!(count = list.tools.len(), "Listed remote tools");
        Ok(list.tools)
    }

    /// Invoke a remote tool.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result = self
            .call("tools/call", Some(serde_json::to_value(params)?))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::malformed(format!("Invalid tools/call result: {e}")))
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> McpResult<()> {
        self.transport.close().await
    }

    async fn call(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.next_request_id();
        let response = self
            .transport
            .request(JsonRpcRequest::new(id.clone(), method, params))
            .await?;

        if response.id.as_ref() != Some(&id) {
            return Err(McpError::malformed(format!(
                "Response id {:?} does not match request id {id}",
                response.id
            )));
        }

        if let Some(error) = response.error {
            debug!(method, code = error.code, message = %error.message, "Remote error");
            return Err(McpError::Remote {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::malformed(format!("Response to {method} has no result")))
    }
}

impl std::fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClient")
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}
