//! Amazon Bedrock provider implementation.
//!
//! Uses the Converse API, which accepts the same message shape for every
//! model family hosted on Bedrock. Requests are signed with SigV4 using
//! credentials from the config or the standard AWS environment variables.

use crate::{
    error::ProviderError,
    message::{ContentPart, Message, Role},
    stream::{FinishReason, StreamChunk, Usage},
    GenerateOptions, LanguageModel, ProviderResult, ToolDefinition,
};
use agentbridge_auth::{AwsCredentials, SigV4Signer};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use tracing::{debug, trace, warn};
use url::Url;

/// Default AWS region for Bedrock.
const DEFAULT_REGION: &str = "us-east-1";

/// Default model: small, cheap and tool-capable.
pub const DEFAULT_MODEL_ID: &str = "amazon.nova-micro-v1:0";

/// SigV4 service name for the Bedrock runtime.
const SIGNING_SERVICE: &str = "bedrock";

/// Bedrock provider configuration.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// AWS region.
    pub region: String,
    /// Model identifier or inference profile ARN.
    pub model_id: String,
    /// AWS credentials. Falls back to the environment when `None`.
    pub credentials: Option<AwsCredentials>,
    /// Runtime endpoint override (tests, VPC endpoints).
    pub endpoint: Option<String>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            credentials: None,
            endpoint: None,
        }
    }
}

impl BedrockConfig {
    pub fn new(region: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Amazon Bedrock provider.
pub struct BedrockProvider {
    client: reqwest::Client,
    signer: SigV4Signer,
    endpoint: String,
    model_id: String,
}

impl BedrockProvider {
    /// Create a new Bedrock provider.
    pub fn new(config: BedrockConfig) -> ProviderResult<Self> {
        let credentials = config
            .credentials
            .or_else(AwsCredentials::from_env)
            .ok_or_else(|| ProviderError::missing_api_key("amazon-bedrock (AWS_ACCESS_KEY_ID)"))?;

        let region = if config.region.is_empty() {
            std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string())
        } else {
            config.region
        };

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));

        debug!(region = %region, model = %config.model_id, "Creating Bedrock provider");

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::internal(e.to_string()))?;

        Ok(Self {
            client,
            signer: SigV4Signer::new(credentials, region, SIGNING_SERVICE),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model_id: config.model_id,
        })
    }

    fn converse_url(&self) -> ProviderResult<Url> {
        let url = format!(
            "{}/model/{}/converse",
            self.endpoint,
            urlencoding::encode(&self.model_id)
        );
        Ok(Url::parse(&url)?)
    }

    /// Build the Converse request body.
    fn build_request(&self, messages: &[Message], options: &GenerateOptions) -> Value {
        let (system, converse_messages) = convert_messages(messages);

        let system = match (system, &options.system) {
            (mut s, Some(opt_system)) => {
                s.insert(0, json!({ "text": opt_system }));
                s
            }
            (s, None) => s,
        };

        let mut request = json!({ "messages": converse_messages });

        if !system.is_empty() {
            request["system"] = json!(system);
        }

        let mut inference_config = serde_json::Map::new();
        if let Some(max_tokens) = options.max_tokens {
            inference_config.insert("maxTokens".into(), json!(max_tokens));
        }
        if let Some(temp) = options.temperature {
            inference_config.insert("temperature".into(), json!(temp));
        }
        if let Some(top_p) = options.top_p {
            inference_config.insert("topP".into(), json!(top_p));
        }
        if !inference_config.is_empty() {
            request["inferenceConfig"] = Value::Object(inference_config);
        }

        if let Some(tool_config) = convert_tools(&options.tools) {
            request["toolConfig"] = tool_config;
        }

        if let Some(Value::Object(extra)) = &options.provider_options {
            for (key, value) in extra {
                request[key.as_str()] = value.clone();
            }
        }

        request
    }
}

/// Convert messages to Converse format.
///
/// Converse requires strictly alternating user and assistant turns, so tool
/// results (sent as user content) are folded into the preceding user turn.
fn convert_messages(messages: &[Message]) -> (Vec<Value>, Vec<Value>) {
    let mut system = Vec::new();
    let mut converse: Vec<Value> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system.push(json!({ "text": msg.text() }));
                continue;
            }
            Role::User | Role::Tool => "user",
            Role::Assistant => "assistant",
        };

        let content = convert_content(&msg.content, role == "assistant");
        if content.is_empty() {
            continue;
        }

        match converse.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(existing) = last["content"].as_array_mut() {
                    existing.extend(content);
                }
            }
            _ => converse.push(json!({ "role": role, "content": content })),
        }
    }

    (system, converse)
}

/// Convert content parts to Converse blocks.
fn convert_content(parts: &[ContentPart], is_assistant: bool) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if !text.is_empty() => Some(json!({ "text": text })),
            ContentPart::Text { .. } => None,
            ContentPart::ToolUse { id, name, input } if is_assistant => Some(json!({
                "toolUse": {
                    "toolUseId": id,
                    "name": name,
                    "input": input
                }
            })),
            ContentPart::ToolUse { .. } => {
                warn!("Tool use outside an assistant turn, skipping");
                None
            }
            ContentPart::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(json!({
                "toolResult": {
                    "toolUseId": tool_use_id,
                    "content": [{ "text": content }],
                    "status": if is_error.unwrap_or(false) { "error" } else { "success" }
                }
            })),
        })
        .collect()
}

/// Convert tools to Converse format.
fn convert_tools(tools: &[ToolDefinition]) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }

    let specs: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "toolSpec": {
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": { "json": tool.parameters }
                }
            })
        })
        .collect();

    Some(json!({ "tools": specs }))
}

/// Turn a Converse response body into the chunk sequence a streaming model
/// would have produced.
fn response_chunks(body: &Value) -> ProviderResult<Vec<StreamChunk>> {
    let blocks = body
        .pointer("/output/message/content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::invalid_response("Converse response has no output message"))?;

    let mut chunks = Vec::new();

    for block in blocks {
        if let Some(text) = block.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                chunks.push(StreamChunk::TextStart);
                chunks.push(StreamChunk::text(text));
                chunks.push(StreamChunk::TextEnd);
            }
        } else if let Some(tool_use) = block.get("toolUse") {
            let id = tool_use
                .get("toolUseId")
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::invalid_response("toolUse block without toolUseId"))?;
            let name = tool_use
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ProviderError::invalid_response("toolUse block without name"))?;
            let input = tool_use.get("input").cloned().unwrap_or_else(|| json!({}));

            chunks.push(StreamChunk::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            });
            chunks.push(StreamChunk::tool_call(id, name, input.to_string()));
        } else {
            trace!(block = %block, "Ignoring unsupported content block");
        }
    }

    let usage = body
        .get("usage")
        .map(|u| {
            Usage::new(
                u.get("inputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
                u.get("outputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            )
        })
        .unwrap_or_default();

    let finish_reason = body
        .get("stopReason")
        .and_then(Value::as_str)
        .map(FinishReason::from_converse)
        .unwrap_or_default();

    chunks.push(StreamChunk::FinishStep {
        usage,
        finish_reason,
    });

    Ok(chunks)
}

#[async_trait]
impl LanguageModel for BedrockProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        let request = self.build_request(&messages, &options);
        let body = serde_json::to_vec(&request)?;
        let url = self.converse_url()?;

        debug!(model = %self.model_id, region = %self.signer.region(), "Sending Bedrock request");
        trace!(request = %request, "Full request");

        let signed = self
            .signer
            .sign("POST", &url, Some("application/json"), &body)?;

        let mut builder = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("accept", "application/json");
        for (name, value) in signed {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Bedrock API error");
            return Err(ProviderError::api_error(status.as_u16(), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
        let chunks = response_chunks(&body)?;

        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_id(&self) -> &str {
        "amazon-bedrock"
    }
}
