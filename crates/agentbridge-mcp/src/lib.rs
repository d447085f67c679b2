//! Model Context Protocol (MCP) engine, transports and tool client.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────┐
//!  serverless event ─▶│  bridge          │──┐
//!                     └──────────────────┘  │   ┌────────────────┐   ┌──────────────┐
//!                     ┌──────────────────┐  ├──▶│ ProtocolEngine │──▶│ ToolHandlers │
//!  POST /mcp ────────▶│  http_serve      │──┘   └────────────────┘   └──────────────┘
//!                     └──────────────────┘
//!
//!  ToolClient ──▶ Transport (streamable HTTP / invocation / local) ──▶ remote engine
//! ```
//!
//! Engines are cheap and built from a [`ToolRegistry`] on demand, so the same
//! tools behave identically behind a long-lived listener and behind a one-shot
//! serverless invocation.
//!
//! # Example
//!
//! ```no_run
//! use agentbridge_mcp::{LocalTransport, ToolBuilder, ToolClient, ToolRegistry, ToolSet};
//!
//! # async fn example() -> agentbridge_mcp::McpResult<()> {
//! let registry = ToolRegistry::from_tools(ToolSet::new().with(
//!     ToolBuilder::new("greeting")
//!         .description("Greet someone by name")
//!         .sync(|args| Ok(format!("Hello {}!", args["name"].as_str().unwrap_or("there")).into())),
//! ));
//!
//! let client = ToolClient::new(LocalTransport::new(registry));
//! let result = client.call_tool("greeting", serde_json::json!({"name": "Bob"})).await?;
//! assert_eq!(result.text(), "Hello Bob!");
//! # Ok(())
//! # }
//! ```

pub mod bridge;
mod client;
pub mod engine;
mod error;
pub mod http;
pub mod http_serve;
pub mod invocation;
pub mod local;
pub mod protocol;
pub mod registry;
mod transport;

pub use bridge::{handle_event, handle_raw_event, Envelope};
pub use client::ToolClient;
pub use engine::{Dispatch, ProtocolEngine};
pub use error::{McpError, McpResult};
pub use http::{HttpTransportConfig, StreamableHttpTransport};
pub use http_serve::{create_mcp_router, McpHttpConfig, McpHttpState, SessionMode};
pub use invocation::InvocationTransport;
pub use local::LocalTransport;
pub use protocol::{ErrorCode, RequestId, ToolCallResult, ToolContent, ToolDescriptor};
pub use registry::{ServerTool, ToolBuilder, ToolHandler, ToolRegistry, ToolSet};
pub use transport::Transport;
