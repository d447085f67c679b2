//! Shared utilities for agentbridge.
//!
//! Currently this is the logging setup shared by every process the workspace
//! produces (tool servers, agent hosts and serverless handlers).

pub mod log;

pub use log::{LogConfig, LogFormat, LogLevel};
