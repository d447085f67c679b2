//! Server state.

use agentbridge_core::AgentLoop;

/// Shared state for all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The agent answering inquiries. Each request starts its own run.
    pub agent: AgentLoop,
}

impl AppState {
    pub fn new(agent: AgentLoop) -> Self {
        Self { agent }
    }
}
