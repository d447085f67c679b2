//! Tool server command.

use agentbridge_mcp::{
    http_serve, McpHttpConfig, McpHttpState, SessionMode, ToolBuilder, ToolRegistry, ToolSet,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

/// Tools served by `serve-tools` and `handle-event`.
pub fn builtin_registry() -> ToolRegistry {
    let greeting = ToolBuilder::new("greeting")
        .description("Greet someone by name")
        .input_schema(json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        }))
        .sync(|args| {
            let name = args
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| "missing required argument: name".to_string())?;
            Ok(Value::String(format!("Hello {name}!")))
        });

    ToolRegistry::from_tools(ToolSet::new().with(greeting))
        .with_server_info("agentbridge-tools", env!("CARGO_PKG_VERSION"))
}

/// Options for the persistent tool server.
#[derive(Debug, Clone)]
pub struct ToolServerOptions {
    pub address: SocketAddr,
    pub stateful: bool,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
}

impl ToolServerOptions {
    fn http_config(&self) -> McpHttpConfig {
        let mut config = McpHttpConfig::default().with_mode(if self.stateful {
            SessionMode::Stateful
        } else {
            SessionMode::Stateless
        });
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(ref key) = self.api_key {
            config = config.with_api_key(key.clone());
        }
        config
    }
}

/// Serve the built-in tools until the process is stopped.
pub async fn run_tool_server(options: ToolServerOptions) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(options.address).await?;
    let state = McpHttpState::new(builtin_registry(), options.http_config());
    http_serve::serve(listener, state).await?;
    Ok(())
}
