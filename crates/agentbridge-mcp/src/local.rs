//! In-process transport backed by a fresh engine per request.

use crate::error::McpResult;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::registry::ToolRegistry;
use crate::transport::Transport;
use async_trait::async_trait;

/// Transport that dispatches straight into engines built from a registry.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    registry: ToolRegistry,
}

impl LocalTransport {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        Ok(self.registry.engine().handle(request).await)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        self.registry.engine().handle_notification(&notification);
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
