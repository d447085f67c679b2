//! The agent exposed as an MCP tool.

use agentbridge_core::AgentLoop;
use agentbridge_mcp::{ToolBuilder, ToolRegistry, ToolSet};
use serde_json::{json, Value};
use tracing::debug;

/// Registry with one tool, `inquire(question)`, answered by `agent`.
pub fn inquire_registry(agent: AgentLoop) -> ToolRegistry {
    let tools = ToolSet::new().with(
        ToolBuilder::new("inquire")
            .description("Ask this agent a question and get its complete answer")
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The question to answer" }
                },
                "required": ["question"]
            }))
            .asynchronous(move |args| {
                let agent = agent.clone();
                async move {
                    let question = args
                        .get("question")
                        .and_then(Value::as_str)
                        .filter(|q| !q.trim().is_empty())
                        .ok_or_else(|| "missing required argument: question".to_string())?
                        .to_string();
                    debug!(question = %question, "Inquire tool called");
                    agent
                        .ask(question)
                        .await
                        .map(Value::String)
                        .map_err(|e| e.to_string())
                }
            }),
    );

    ToolRegistry::from_tools(tools).with_server_info("agentbridge-agent", env!("CARGO_PKG_VERSION"))
}
