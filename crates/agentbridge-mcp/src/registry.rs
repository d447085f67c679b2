//! Tool definitions and the registry engines are built from.
//!
//! A [`ToolRegistry`] is a factory: every engine gets its own [`ToolSet`], so
//! state captured by a tool closure lives exactly as long as that engine.

use crate::engine::ProtocolEngine;
use crate::protocol::{empty_object_schema, Implementation, ToolDescriptor};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result returned by a tool handler. Errors are plain messages.
pub type ToolOutput = Result<Value, String>;

type SyncFn = dyn Fn(Value) -> ToolOutput + Send + Sync;
type AsyncFn = dyn Fn(Value) -> BoxFuture<'static, ToolOutput> + Send + Sync;

/// A tool implementation.
#[derive(Clone)]
pub enum ToolHandler {
    /// Runs to completion on the calling task.
    Sync(Arc<SyncFn>),
    /// Returns a future that is awaited by the engine.
    Async(Arc<AsyncFn>),
}

impl ToolHandler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> ToolOutput + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutput> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// Invoke the handler with the call arguments.
    pub async fn call(&self, args: Value) -> ToolOutput {
        match self {
            Self::Sync(f) => f(args),
            Self::Async(f) => f(args).await,
        }
    }
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ToolHandler::Sync"),
            Self::Async(_) => f.write_str("ToolHandler::Async"),
        }
    }
}

/// A tool served by the engine.
#[derive(Debug, Clone)]
pub struct ServerTool {
    pub descriptor: ToolDescriptor,
    pub handler: ToolHandler,
}

impl ServerTool {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Builder for [`ServerTool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Value,
}

impl ToolBuilder {
    /// Create a new tool builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: empty_object_schema(),
        }
    }

    /// Set the tool description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input schema.
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Build the tool with an explicit handler.
    pub fn handler(self, handler: ToolHandler) -> ServerTool {
        ServerTool {
            descriptor: ToolDescriptor {
                name: self.name,
                description: self.description,
                input_schema: self.input_schema,
            },
            handler,
        }
    }

    /// Build the tool with a synchronous closure.
    pub fn sync<F>(self, f: F) -> ServerTool
    where
        F: Fn(Value) -> ToolOutput + Send + Sync + 'static,
    {
        self.handler(ToolHandler::sync(f))
    }

    /// Build the tool with an async closure.
    pub fn asynchronous<F, Fut>(self, f: F) -> ServerTool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutput> + Send + 'static,
    {
        self.handler(ToolHandler::asynchronous(f))
    }
}

/// Ordered set of tools owned by one engine.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<ServerTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing one with the same name in place.
    pub fn insert(&mut self, tool: ServerTool) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn with(mut self, tool: ServerTool) -> Self {
        self.insert(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ServerTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<ServerTool> for ToolSet {
    fn from_iter<I: IntoIterator<Item = ServerTool>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

/// Produces a fresh [`ToolSet`] (and engine) on demand.
#[derive(Clone)]
pub struct ToolRegistry {
    server_info: Implementation,
    factory: Arc<dyn Fn() -> ToolSet + Send + Sync>,
}

impl ToolRegistry {
    /// Registry that calls `factory` for every new engine.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ToolSet + Send + Sync + 'static,
    {
        Self {
            server_info: Implementation::default(),
            factory: Arc::new(factory),
        }
    }

    /// Registry that hands every engine a clone of the same tools.
    ///
    /// Handlers are shared through `Arc`, so any state they capture is shared
    /// too. Use [`ToolRegistry::new`] when state must not outlive an engine.
    pub fn from_tools(tools: ToolSet) -> Self {
        Self::new(move || tools.clone())
    }

    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_info = Implementation {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    /// Build the tools for one engine.
    pub fn instantiate(&self) -> ToolSet {
        (self.factory)()
    }

    /// Build a brand-new engine.
    pub fn engine(&self) -> ProtocolEngine {
        ProtocolEngine::new(self.instantiate()).with_server_info(self.server_info.clone())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("server_info", &self.server_info)
            .finish()
    }
}
