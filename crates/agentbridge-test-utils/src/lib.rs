//! Testing utilities, fixtures, and scripted models for agentbridge.
//!
//! - **Providers**: a [`RecordingProvider`] that replays queued model replies
//!   and records every transcript it was sent
//! - **Fixtures**: small tool registries (greeting, call counter, call log)
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use agentbridge_test_utils::{fixtures, RecordingProvider};
//!
//! let provider = RecordingProvider::new()
//!     .with_tool_call("t1", "greeting", r#"{"name":"Bob"}"#)
//!     .with_response("Bob has been greeted.");
//! let registry = fixtures::greeting_registry();
//! ```

pub mod fixtures;
pub mod providers;

pub use providers::{ProviderResponse, RecordedCall, RecordingProvider};
