//! Test provider implementations.
//!
//! Provides a model that records interactions and returns queued responses.

use agentbridge_provider::{
    message::{ContentPart, Message},
    stream::{FinishReason, StreamChunk, Usage},
    GenerateOptions, LanguageModel, ProviderError, ProviderResult,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};

/// A provider that records all interactions for later inspection.
///
/// Responses are consumed from a queue in order; once the queue is empty the
/// default response is returned for every further call.
#[derive(Clone)]
pub struct RecordingProvider {
    model_id: String,
    /// Recorded calls to generate().
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Queue of responses to return.
    responses: Arc<Mutex<Vec<ProviderResponse>>>,
    /// Default response when queue is empty.
    default_response: Arc<Mutex<ProviderResponse>>,
}

/// A recorded call to the provider.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The messages sent to the provider.
    pub messages: Vec<Message>,
    /// The options used for generation.
    pub options: GenerateOptions,
}

/// A response that the provider can return.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Return a text response.
    Text(String),
    /// Return a tool call.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// Return text followed by tool calls, like a model that explains itself.
    TextWithToolCalls {
        text: String,
        calls: Vec<(String, String, String)>,
    },
    /// Return multiple tool calls.
    MultipleToolCalls(Vec<(String, String, String)>), // (id, name, arguments)
    /// Fail before any chunk is produced.
    Error(String),
    /// Return a sequence of chunks.
    Chunks(Vec<StreamChunk>),
}

impl Default for ProviderResponse {
    fn default() -> Self {
        ProviderResponse::Text("Test response".to_string())
    }
}

impl RecordingProvider {
    /// Create a new recording provider.
    pub fn new() -> Self {
        Self {
            model_id: "test-model".to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(ProviderResponse::default())),
        }
    }

    fn push(self, response: ProviderResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Queue a text response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(ProviderResponse::Text(text.into()))
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.push(ProviderResponse::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    /// Queue a reply with several tool calls, in block order.
    pub fn with_tool_calls(self, calls: &[(&str, &str, &str)]) -> Self {
        self.push(ProviderResponse::MultipleToolCalls(
            calls
                .iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.to_string()))
                .collect(),
        ))
    }

    /// Queue an error response.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(ProviderResponse::Error(message.into()))
    }

    /// Queue an arbitrary response.
    pub fn with(self, response: ProviderResponse) -> Self {
        self.push(response)
    }

    /// Set the default response when queue is empty.
    pub fn with_default_response(self, response: ProviderResponse) -> Self {
        *self.default_response.lock().unwrap() = response;
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Get the last call made.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Check if a message containing the given text was sent.
    pub fn was_sent(&self, text: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|call| {
            call.messages.iter().any(|msg| {
                msg.content.iter().any(|part| match part {
                    ContentPart::Text { text: t } => t.contains(text),
                    ContentPart::ToolResult { content, .. } => content.contains(text),
                    _ => false,
                })
            })
        })
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for RecordingProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { messages, options });

        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                self.default_response.lock().unwrap().clone()
            } else {
                responses.remove(0)
            }
        };

        if let ProviderResponse::Error(msg) = response {
            return Err(ProviderError::internal(msg));
        }

        Ok(Box::pin(try_stream! {
            match response {
                ProviderResponse::Text(text) => {
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::TextEnd;
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::EndTurn,
                    };
                }
                ProviderResponse::ToolCall { id, name, arguments } => {
                    yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                    yield StreamChunk::ToolCall { id, name, arguments };
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::TextWithToolCalls { text, calls } => {
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::TextEnd;
                    for (id, name, arguments) in calls {
                        yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                        yield StreamChunk::ToolCall { id, name, arguments };
                    }
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::MultipleToolCalls(calls) => {
                    for (id, name, arguments) in calls {
                        yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                        yield StreamChunk::ToolCall { id, name, arguments };
                    }
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::Error(msg) => {
                    Err(ProviderError::internal(msg))?;
                }
                ProviderResponse::Chunks(chunks) => {
                    for chunk in chunks {
                        yield chunk;
                    }
                }
            }
        }))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_id(&self) -> &str {
        "recording"
    }
}
