//! Agent loop - drives a model through tool calls until it answers.
//!
//! One run owns its transcript. The loop:
//! - lists the remote tools once
//! - sends the transcript to the model and streams text back as it arrives
//! - invokes requested tools one after another, in the order the model
//!   emitted them, and appends their results to the transcript
//! - stops at the first reply that requests no tools

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::error::{AgentError, AgentResult};
use agentbridge_mcp::{McpError, ToolClient, ToolDescriptor};
use agentbridge_provider::{
    stream::StreamChunk, ContentPart, GenerateOptions, LanguageModel, Message, ProviderError,
    ToolDefinition,
};
use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// System prompt.
    pub system: Option<String>,
    /// Maximum model calls per run.
    pub max_iterations: usize,
    /// Maximum tokens to generate per model call.
    pub max_tokens: Option<u32>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            system: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// A tool request collected from one model reply.
#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// One block of a model reply, in arrival order.
#[derive(Debug)]
enum ReplyBlock {
    Text(String),
    Call(PendingCall),
}

impl ReplyBlock {
    fn call_mut(&mut self, id: &str) -> Option<&mut PendingCall> {
        match self {
            ReplyBlock::Call(call) if call.id == id => Some(call),
            _ => None,
        }
    }
}

/// The agent loop executor.
#[derive(Clone)]
pub struct AgentLoop {
    model: Arc<dyn LanguageModel>,
    tools: ToolClient,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolClient, config: LoopConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Answer `seed`, yielding text fragments as the model produces them.
    ///
    /// Nothing happens until the stream is polled. A failure is yielded as
    /// the last item.
    pub fn run(&self, seed: impl Into<String>) -> BoxStream<'static, AgentResult<String>> {
        let model = self.model.clone();
        let tools = self.tools.clone();
        let config = self.config.clone();
        let seed = seed.into();

        Box::pin(try_stream! {
            let descriptors = tools.list_tools().await?;
            let options = GenerateOptions {
                system: config.system.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                tools: descriptors.into_iter().map(tool_definition).collect(),
                ..Default::default()
            };

            info!(
                model = model.model_id(),
                tools = options.tools.len(),
                "Starting agent run"
            );

            let mut transcript = vec![Message::user(seed)];
            let mut iterations = 0;

            loop {
                if iterations >= config.max_iterations {
                    warn!(limit = config.max_iterations, "Tool loop exceeded");
                    Err(AgentError::ToolLoopExceeded { limit: config.max_iterations })?;
                }
                iterations += 1;
                debug!(iteration = iterations, "Calling model");

                let mut reply = model.generate(transcript.clone(), options.clone()).await?;
                let mut blocks: Vec<ReplyBlock> = Vec::new();

                while let Some(chunk) = reply.next().await {
                    match chunk? {
                        StreamChunk::TextDelta(delta) => {
                            match blocks.last_mut() {
                                Some(ReplyBlock::Text(text)) => text.push_str(&delta),
                                _ => blocks.push(ReplyBlock::Text(delta.clone())),
                            }
                            yield delta;
                        }
                        StreamChunk::ToolCallStart { id, name } => {
                            debug!(id = %id, name = %name, "Tool call started");
                            let arguments = String::new();
                            blocks.push(ReplyBlock::Call(PendingCall { id, name, arguments }));
                        }
                        StreamChunk::ToolCall { id, name, arguments } => {
                            match blocks.iter_mut().find_map(|b| b.call_mut(&id)) {
                                Some(call) => call.arguments = arguments,
                                None => {
                                    let call = PendingCall { id, name, arguments };
                                    blocks.push(ReplyBlock::Call(call));
                                }
                            }
                        }
                        StreamChunk::FinishStep { usage, finish_reason } => {
                            debug!(
                                input = usage.input_tokens,
                                output = usage.output_tokens,
                                reason = ?finish_reason,
                                "Step finished"
                            );
                        }
                        StreamChunk::Error(message) => {
                            Err(ProviderError::invalid_response(message))?;
                        }
                        StreamChunk::TextStart | StreamChunk::TextEnd => {}
                    }
                }

                if !blocks.iter().any(|b| matches!(b, ReplyBlock::Call(_))) {
                    info!(iterations, "Agent run finished");
                    break;
                }

                // The assistant turn keeps the reply's block order; tools run
                // once the whole reply has been read.
                let mut assistant = Vec::with_capacity(blocks.len());
                let mut parsed = Vec::new();
                for block in blocks {
                    match block {
                        ReplyBlock::Text(text) => assistant.push(ContentPart::text(text)),
                        ReplyBlock::Call(call) => {
                            let input = parse_arguments(&call.arguments);
                            let part_input = input
                                .as_ref()
                                .ok()
                                .cloned()
                                .unwrap_or_else(|| Value::Object(Default::default()));
                            assistant.push(ContentPart::tool_use(&call.id, &call.name, part_input));
                            parsed.push((call, input));
                        }
                    }
                }
                transcript.push(Message::assistant_parts(assistant));

                for (call, input) in parsed {
                    let result = match input {
                        Ok(arguments) => invoke(&tools, &call, arguments).await?,
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "Unparseable tool arguments");
                            Message::tool_error(&call.id, format!("Invalid tool arguments: {e}"))
                        }
                    };
                    transcript.push(result);
                }
            }
        })
    }

    /// Run to completion and return the whole answer.
    pub async fn ask(&self, question: impl Into<String>) -> AgentResult<String> {
        let mut stream = self.run(question);
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("model", &self.model.model_id())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

fn tool_definition(descriptor: ToolDescriptor) -> ToolDefinition {
    ToolDefinition {
        name: descriptor.name,
        description: descriptor.description,
        parameters: descriptor.input_schema,
    }
}

/// Empty arguments mean "no arguments".
fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

/// Invoke one tool and turn the outcome into a tool-result turn.
///
/// Remote errors are answers the model can act on. Anything else means the
/// tool endpoint is unusable and ends the run.
async fn invoke(tools: &ToolClient, call: &PendingCall, arguments: Value) -> AgentResult<Message> {
    debug!(id = %call.id, tool = %call.name, "Invoking tool");

    match tools.call_tool(&call.name, arguments).await {
        Ok(result) if result.is_error => Ok(Message::tool_error(&call.id, result.text())),
        Ok(result) => Ok(Message::tool_result(&call.id, result.text())),
        Err(McpError::Remote {
            code,
            message,
            data,
        }) => {
            warn!(tool = %call.name, code, message = %message, "Tool returned an error");
            Ok(Message::tool_error(&call.id, remote_error_text(&message, data.as_ref())))
        }
        Err(e) => Err(AgentError::Tool(e)),
    }
}

fn remote_error_text(message: &str, data: Option<&Value>) -> String {
    match data {
        Some(Value::String(detail)) => format!("{message}: {detail}"),
        Some(Value::Null) | None => message.to_string(),
        Some(other) => format!("{message}: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbridge_auth::CredentialProvider;
    use agentbridge_mcp::{HttpTransportConfig, LocalTransport, StreamableHttpTransport};
    use agentbridge_provider::{FinishReason, Role};
    use agentbridge_test_utils::fixtures::{call_log_registry, counter_registry, greeting_registry};
    use agentbridge_test_utils::{ProviderResponse, RecordingProvider};
    use std::sync::atomic::Ordering;

    fn agent(provider: &RecordingProvider, tools: ToolClient, max_iterations: usize) -> AgentLoop {
        AgentLoop::new(
            Arc::new(provider.clone()),
            tools,
            LoopConfig {
                max_iterations,
                ..LoopConfig::default()
            },
        )
    }

    async fn collect(agent: &AgentLoop, seed: &str) -> Vec<AgentResult<String>> {
        agent.run(seed).collect().await
    }

    #[tokio::test]
    async fn test_plain_answer_is_one_fragment() {
        let provider = RecordingProvider::new().with_response("Forty two.");
        let tools = ToolClient::new(LocalTransport::new(greeting_registry()));

        let items = collect(&agent(&provider, tools, 25), "What is the answer?").await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "Forty two.");
        assert_eq!(provider.call_count(), 1);

        let call = provider.last_call().unwrap();
        assert_eq!(call.options.tools.len(), 1);
        assert_eq!(call.options.tools[0].name, "greeting");
        assert_eq!(call.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back_not_emitted() {
        let provider = RecordingProvider::new()
            .with_tool_call("t1", "greeting", r#"{"name":"Bob"}"#)
            .with_response("I greeted Bob.");
        let tools = ToolClient::new(LocalTransport::new(greeting_registry()));

        let answer = agent(&provider, tools, 25).ask("Greet Bob").await.unwrap();

        assert_eq!(answer, "I greeted Bob.");
        assert_eq!(provider.call_count(), 2);

        let second = &provider.calls()[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[1].tool_uses().count(), 1);
        assert_eq!(second[2], Message::tool_result("t1", "Hello Bob!"));
    }

    #[tokio::test]
    async fn test_tools_run_in_block_order() {
        let provider = RecordingProvider::new()
            .with(ProviderResponse::TextWithToolCalls {
                text: "Running both. ".into(),
                calls: vec![
                    ("1".into(), "a".into(), "{}".into()),
                    ("2".into(), "b".into(), "".into()),
                ],
            })
            .with_response("Done.");
        let (registry, log) = call_log_registry();
        let tools = ToolClient::new(LocalTransport::new(registry));

        let items: Vec<String> = collect(&agent(&provider, tools, 25), "go")
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(items, vec!["Running both. ", "Done."]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        let transcript = &provider.calls()[1].messages;
        assert_eq!(transcript[1].text(), "Running both. ");
        assert_eq!(transcript[2], Message::tool_result("1", "a done"));
        assert_eq!(transcript[3], Message::tool_result("2", "b done"));
    }

    #[tokio::test]
    async fn test_interleaved_reply_keeps_block_order() {
        let provider = RecordingProvider::new()
            .with(ProviderResponse::Chunks(vec![
                StreamChunk::text("Checking a. "),
                StreamChunk::tool_call("1", "a", "{}"),
                StreamChunk::text("Then b."),
                StreamChunk::tool_call("2", "b", "{}"),
                StreamChunk::finish(FinishReason::ToolUse),
            ]))
            .with_response("All done.");
        let (registry, log) = call_log_registry();
        let tools = ToolClient::new(LocalTransport::new(registry));

        let items: Vec<String> = collect(&agent(&provider, tools, 25), "go")
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(items, vec!["Checking a. ", "Then b.", "All done."]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        let assistant = &provider.calls()[1].messages[1];
        let kinds: Vec<&str> = assistant
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { .. } => "text",
                ContentPart::ToolUse { .. } => "tool_use",
                ContentPart::ToolResult { .. } => "tool_result",
            })
            .collect();
        assert_eq!(kinds, vec!["text", "tool_use", "text", "tool_use"]);
    }

    #[tokio::test]
    async fn test_each_tool_call_gets_a_fresh_engine() {
        let provider = RecordingProvider::new()
            .with_tool_calls(&[("1", "counter", "{}"), ("2", "counter", "{}")])
            .with_response("Counted.");
        let (registry, engines) = counter_registry();
        let tools = ToolClient::new(LocalTransport::new(registry));

        agent(&provider, tools, 25).ask("count twice").await.unwrap();

        let transcript = &provider.calls()[1].messages;
        assert_eq!(transcript[2], Message::tool_result("1", "1"));
        assert_eq!(transcript[3], Message::tool_result("2", "1"));
        // One engine for the tool listing, one per call.
        assert_eq!(engines.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_loop_bound() {
        let provider = RecordingProvider::new().with_default_response(ProviderResponse::ToolCall {
            id: "t".into(),
            name: "a".into(),
            arguments: "{}".into(),
        });
        let (registry, log) = call_log_registry();
        let tools = ToolClient::new(LocalTransport::new(registry));

        let items = collect(&agent(&provider, tools, 3), "loop forever").await;

        assert_eq!(provider.call_count(), 3);
        assert_eq!(log.lock().unwrap().len(), 3);
        assert!(matches!(
            items.last(),
            Some(Err(AgentError::ToolLoopExceeded { limit: 3 }))
        ));
    }

    #[tokio::test]
    async fn test_remote_errors_are_fed_back() {
        let provider = RecordingProvider::new()
            .with_tool_calls(&[("1", "missing", "{}"), ("2", "fail", "{}")])
            .with_response("Both failed.");
        let (registry, _log) = call_log_registry();
        let tools = ToolClient::new(LocalTransport::new(registry));

        let answer = agent(&provider, tools, 25).ask("try").await.unwrap();
        assert_eq!(answer, "Both failed.");

        let transcript = &provider.calls()[1].messages;
        assert_eq!(
            transcript[2],
            Message::tool_error("1", "Unknown tool: missing")
        );
        match &transcript[3].content[0] {
            ContentPart::ToolResult {
                content, is_error, ..
            } => {
                assert!(content.contains("tool exploded"));
                assert_eq!(*is_error, Some(true));
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_fed_back() {
        let provider = RecordingProvider::new()
            .with_tool_call("1", "greeting", "{not json")
            .with_response("Sorry.");
        let tools = ToolClient::new(LocalTransport::new(greeting_registry()));

        agent(&provider, tools, 25).ask("hi").await.unwrap();

        assert!(provider.was_sent("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_transport_failure_ends_run() {
        let provider = RecordingProvider::new().with_response("unused");
        let transport = StreamableHttpTransport::new(
            HttpTransportConfig {
                url: "http://127.0.0.1:1/mcp".to_string(),
                timeout_secs: 1,
            },
            CredentialProvider::None,
        )
        .unwrap();

        let items = collect(&agent(&provider, ToolClient::new(transport), 25), "hi").await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AgentError::Tool(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_error_ends_run() {
        let provider = RecordingProvider::new().with_error("throttled");
        let tools = ToolClient::new(LocalTransport::new(greeting_registry()));

        let result = agent(&provider, tools, 25).ask("hi").await;
        assert!(matches!(result, Err(AgentError::Provider(_))));
    }

    #[tokio::test]
    async fn test_system_prompt_is_forwarded() {
        let provider = RecordingProvider::new();
        let tools = ToolClient::new(LocalTransport::new(greeting_registry()));
        let agent = AgentLoop::new(
            Arc::new(provider.clone()),
            tools,
            LoopConfig {
                system: Some("You answer HR questions.".into()),
                ..LoopConfig::default()
            },
        );

        agent.ask("hi").await.unwrap();
        assert_eq!(
            provider.last_call().unwrap().options.system.as_deref(),
            Some("You answer HR questions.")
        );
    }
}
