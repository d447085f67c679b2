//! Language model abstraction for agentbridge.
//!
//! The agent loop only needs one capability from a model: take a transcript
//! and a set of tool definitions, and stream back text and tool-use requests.
//! That capability is the [`LanguageModel`] trait. Amazon Bedrock's Converse
//! API is the one network implementation shipped here.

pub mod bedrock;
pub mod error;
pub mod message;
pub mod stream;

pub use bedrock::{BedrockConfig, BedrockProvider};
pub use error::{ProviderError, ProviderResult};
pub use message::{ContentPart, Message, Role};
pub use stream::{FinishReason, StreamChunk, Usage};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

/// Options for text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0-1.0).
    pub temperature: Option<f32>,
    /// Top-p (nucleus) sampling.
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// System prompt.
    pub system: Option<String>,
    /// Available tools.
    pub tools: Vec<ToolDefinition>,
    /// Provider-specific options, merged into the request body.
    pub provider_options: Option<Value>,
}

/// A tool definition for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: Value,
}

/// The main trait for language models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a streaming response.
    ///
    /// Returns a stream of `StreamChunk` items representing the response.
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>>;

    /// The model identifier requests are sent to.
    fn model_id(&self) -> &str;

    /// Get the provider ID (e.g., "amazon-bedrock").
    fn provider_id(&self) -> &str;
}

/// A boxed language model for dynamic dispatch.
pub type BoxedLanguageModel = Arc<dyn LanguageModel>;
