//! HTTP host for agentbridge agents.
//!
//! Serves a health check, a streamed inquiry endpoint, the hosted-runtime
//! invocation contract and, optionally, an MCP endpoint that exposes the
//! agent itself as the `inquire` tool so other agents can call it.

pub mod routes;
pub mod state;
pub mod tools;

pub use routes::{create_router, create_router_with_mcp, serve};
pub use state::AppState;
pub use tools::inquire_registry;
