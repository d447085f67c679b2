//! Agent host and one-shot question commands.

use agentbridge_core::{build_tool_client, AgentConfig, AgentLoop};
use agentbridge_mcp::McpHttpConfig;
use agentbridge_provider::BedrockProvider;
use agentbridge_server::{create_router, create_router_with_mcp, serve, AppState};
use futures::StreamExt;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Build the agent from environment configuration.
fn agent_from_env() -> anyhow::Result<AgentLoop> {
    let config = AgentConfig::from_env()?;
    let model = BedrockProvider::new(config.bedrock_config())?;
    let tools = build_tool_client(&config)?;

    info!(
        model = %config.model_id,
        max_iterations = config.max_iterations,
        "Agent configured"
    );
    Ok(AgentLoop::new(Arc::new(model), tools, config.loop_config()))
}

/// Serve the agent over HTTP until the process is stopped.
pub async fn run_agent_server(address: SocketAddr, expose_mcp: bool) -> anyhow::Result<()> {
    let state = AppState::new(agent_from_env()?);
    let router = if expose_mcp {
        create_router_with_mcp(state, McpHttpConfig::default())
    } else {
        create_router(state)
    };

    let listener = tokio::net::TcpListener::bind(address).await?;
    serve(listener, router).await?;
    Ok(())
}

/// Answer one question, printing fragments as they arrive.
pub async fn ask(question: String) -> anyhow::Result<()> {
    let agent = agent_from_env()?;
    let mut stream = agent.run(question);
    let mut stdout = std::io::stdout();

    while let Some(fragment) = stream.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
