//! agentbridge - MCP tool servers, agent hosts and serverless tool handlers.
//!
//! This is the main entry point for the agentbridge CLI.

mod commands;

use agentbridge_util::{LogConfig, LogLevel};
use clap::{Parser, Subcommand, ValueEnum};
use commands::ToolServerOptions;
use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "agentbridge")]
#[command(author, version, about = "Bridge language-model agents and MCP tools", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the built-in tools over MCP streamable HTTP
    ServeTools {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8002")]
        address: SocketAddr,

        /// Keep one engine per client session instead of one per request
        #[arg(long)]
        stateful: bool,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Require this API key from clients
        #[arg(long, env = "MCP_API_KEY")]
        api_key: Option<String>,
    },
    /// Serve the agent (configured from the environment) over HTTP
    ServeAgent {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        address: SocketAddr,

        /// Also expose the agent as an MCP `inquire` tool
        #[arg(long)]
        mcp: bool,
    },
    /// Ask the agent one question and print the answer
    Ask {
        /// The question
        question: String,
    },
    /// Handle one serverless invocation event from stdin
    HandleEvent,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        let config = match self.log_format {
            LogFormatArg::Text => LogConfig::default(),
            LogFormatArg::Json => LogConfig::serverless(),
        };
        config.with_level(level)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    agentbridge_util::log::init(cli.log_config());

    match cli.command {
        Commands::ServeTools {
            address,
            stateful,
            timeout_secs,
            api_key,
        } => {
            commands::run_tool_server(ToolServerOptions {
                address,
                stateful,
                timeout_secs,
                api_key,
            })
            .await
        }
        Commands::ServeAgent { address, mcp } => commands::run_agent_server(address, mcp).await,
        Commands::Ask { question } => commands::ask(question).await,
        Commands::HandleEvent => commands::handle_event_from_stdin().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbridge_util::LogFormat;

    #[test]
    fn test_serve_tools_defaults() {
        let cli = Cli::try_parse_from(["agentbridge", "serve-tools"]).unwrap();
        match cli.command {
            Commands::ServeTools {
                address, stateful, ..
            } => {
                assert_eq!(address.port(), 8002);
                assert!(!stateful);
            }
            _ => panic!("expected serve-tools"),
        }
    }

    #[test]
    fn test_json_logging_flag() {
        let cli =
            Cli::try_parse_from(["agentbridge", "handle-event", "--log-format", "json", "-v"])
                .unwrap();
        let config = cli.log_config();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["agentbridge", "ask"]).is_err());
    }
}
