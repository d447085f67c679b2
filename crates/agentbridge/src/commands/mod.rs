//! Command handlers for the agentbridge CLI.

pub mod agent;
pub mod event;
pub mod tools;

pub use agent::*;
pub use event::*;
pub use tools::*;
