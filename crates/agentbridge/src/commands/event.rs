//! Serverless event command: one event on stdin, one envelope on stdout.

use super::tools::builtin_registry;
use agentbridge_mcp::handle_raw_event;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Handle one invocation event read from stdin.
pub async fn handle_event_from_stdin() -> anyhow::Result<()> {
    let mut raw = Vec::new();
    tokio::io::stdin().read_to_end(&mut raw).await?;

    let envelope = handle_raw_event(&builtin_registry(), &raw).await;
    info!(status = envelope.status_code, "Event handled");

    let mut out = serde_json::to_vec(&envelope)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
