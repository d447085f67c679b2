//! Agent loop and runtime configuration for agentbridge.
//!
//! An [`AgentLoop`] pairs a [`LanguageModel`](agentbridge_provider::LanguageModel)
//! with a [`ToolClient`](agentbridge_mcp::ToolClient). [`AgentConfig`] reads
//! the deployment settings from the environment and [`build_tool_client`]
//! turns them into a client with the right transport and credentials.

pub mod agent;
pub mod config;
pub mod error;
pub mod tools;

pub use agent::{AgentLoop, LoopConfig};
pub use config::{agentcore_url, AgentConfig, ToolTransport, DEFAULT_MAX_ITERATIONS, LOCAL_MCP_URL};
pub use error::{AgentError, AgentResult};
pub use tools::build_tool_client;
