//! Transport-agnostic MCP request dispatch.
//!
//! The engine knows nothing about HTTP or serverless events. Adapters feed it
//! raw payload bytes (or decoded frames) and map the [`Dispatch`] outcome onto
//! their own response shape.

use crate::protocol::{
    CallToolParams, DecodeError, ErrorCode, Implementation, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, Message, RequestId,
    ServerCapabilities, ToolCallResult, ToolsCapability, PROTOCOL_VERSION,
};
use crate::registry::ToolSet;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

/// Outcome of handling one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// One response frame.
    Reply(JsonRpcResponse),
    /// Responses for a batch, in request order.
    Batch(Vec<JsonRpcResponse>),
    /// Only notifications were received; nothing to send back.
    Accepted,
    /// The payload could not be decoded. The engine did not dispatch anything.
    Rejected(JsonRpcResponse),
}

impl Dispatch {
    /// HTTP status an adapter should report.
    pub fn status_code(&self) -> u16 {
        match self {
            Dispatch::Reply(_) | Dispatch::Batch(_) => 200,
            Dispatch::Accepted => 202,
            Dispatch::Rejected(_) => 400,
        }
    }

    /// Serialized response body; empty for [`Dispatch::Accepted`].
    pub fn body(&self) -> String {
        // Response frames hold only string keys and JSON values.
        match self {
            Dispatch::Reply(r) | Dispatch::Rejected(r) => {
                serde_json::to_string(r).unwrap_or_default()
            }
            Dispatch::Batch(rs) => serde_json::to_string(rs).unwrap_or_default(),
            Dispatch::Accepted => String::new(),
        }
    }

    /// The single response frame, if this outcome carries exactly one.
    pub fn response(&self) -> Option<&JsonRpcResponse> {
        match self {
            Dispatch::Reply(r) | Dispatch::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// MCP protocol engine bound to one set of tools.
#[derive(Debug)]
pub struct ProtocolEngine {
    server_info: Implementation,
    tools: ToolSet,
}

impl ProtocolEngine {
    pub fn new(tools: ToolSet) -> Self {
        Self {
            server_info: Implementation::default(),
            tools,
        }
    }

    pub fn with_server_info(mut self, info: Implementation) -> Self {
        self.server_info = info;
        self
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Decode and handle a raw payload: a single frame or a batch array.
    pub async fn handle_payload(&self, body: &[u8]) -> Dispatch {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                let error = DecodeError::from(e);
                warn!(error = %error, "Rejecting undecodable payload");
                Dispatch::Rejected(JsonRpcResponse::failure(None, error.to_rpc_error()))
            }
        }
    }

    /// Handle an already parsed payload.
    pub async fn handle_value(&self, value: Value) -> Dispatch {
        match value {
            Value::Array(items) if items.is_empty() => Dispatch::Rejected(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(ErrorCode::InvalidRequest, "Empty batch"),
            )),
            Value::Array(items) => {
                debug!(size = items.len(), "Handling batch");
                let mut replies = Vec::with_capacity(items.len());
                for item in items {
                    match Message::from_value(item) {
                        Ok(message) => {
                            if let Some(reply) = self.handle_message(message).await {
                                replies.push(reply);
                            }
                        }
                        Err(e) => replies.push(JsonRpcResponse::failure(None, e.to_rpc_error())),
                    }
                }
                if replies.is_empty() {
                    Dispatch::Accepted
                } else {
                    Dispatch::Batch(replies)
                }
            }
            single => match Message::from_value(single) {
                Ok(message) => self.dispatch(message).await,
                Err(e) => {
                    warn!(error = %e, "Rejecting invalid frame");
                    Dispatch::Rejected(JsonRpcResponse::failure(None, e.to_rpc_error()))
                }
            },
        }
    }

    /// Handle one decoded frame and wrap the outcome.
    pub async fn dispatch(&self, message: Message) -> Dispatch {
        match self.handle_message(message).await {
            Some(reply) => Dispatch::Reply(reply),
            None => Dispatch::Accepted,
        }
    }

    /// Handle one decoded frame. Only requests produce a response.
    pub async fn handle_message(&self, message: Message) -> Option<JsonRpcResponse> {
        match message {
            Message::Request(request) => Some(self.handle(request).await),
            Message::Notification(notification) => {
                self.handle_notification(&notification);
                None
            }
            Message::Response(response) => {
                debug!(id = ?response.id, "Ignoring inbound response frame");
                None
            }
        }
    }

    /// Handle a JSON-RPC request. Always returns a response with the same id.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, id = %request.id, "Handling MCP request");

        let id = request.id;
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                Some(id),
                JsonRpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("Method not found: {other}"),
                ),
            ),
        }
    }

    pub fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => debug!("Received initialized notification"),
            other => debug!(method = %other, "Received notification"),
        }
    }

    fn handle_initialize(&self, id: RequestId) -> JsonRpcResponse {
        info!(
            name = %self.server_info.name,
            version = %self.server_info.version,
            "Initializing MCP engine"
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.server_info.clone(),
        };
        to_response(id, &result)
    }

    fn handle_list_tools(&self, id: RequestId) -> JsonRpcResponse {
        debug!(count = self.tools.len(), "Listing MCP tools");
        let result = ListToolsResult {
            tools: self.tools.descriptors(),
        };
        to_response(id, &result)
    }

    async fn handle_call_tool(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::new(ErrorCode::InvalidParams, format!("Invalid params: {e}")),
                );
            }
            None => {
                return JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::new(ErrorCode::InvalidParams, "Missing params"),
                );
            }
        };

        let Some(tool) = self.tools.get(&params.name) else {
            warn!(tool = %params.name, "Unknown tool requested");
            return JsonRpcResponse::failure(
                Some(id),
                JsonRpcError::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", params.name)),
            );
        };

        debug!(tool = %params.name, "Calling MCP tool");
        let args = params
            .arguments
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let outcome = AssertUnwindSafe(tool.handler.call(args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(format!("Tool panicked: {}", panic_message(&*payload)))
            });

        match outcome {
            Ok(value) => {
                debug!(tool = %params.name, "Tool completed successfully");
                to_response(id, &ToolCallResult::from_value(value))
            }
            Err(message) => {
                warn!(tool = %params.name, error = %message, "Tool failed");
                JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::new(
                        ErrorCode::ToolExecutionFailed,
                        format!("Tool execution failed: {}", params.name),
                    )
                    .with_data(Value::String(message)),
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            Some(id),
            JsonRpcError::new(ErrorCode::InternalError, format!("Failed to encode result: {e}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolBuilder;
    use serde_json::json;

    fn engine() -> ProtocolEngine {
        let tools = ToolSet::new()
            .with(
                ToolBuilder::new("greeting")
                    .description("Greet someone by name")
                    .input_schema(json!({
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }))
                    .sync(|args| {
                        let name = args["name"].as_str().ok_or("name is required")?;
                        Ok(json!(format!("Hello {name}!")))
                    }),
            )
            .with(ToolBuilder::new("stats").sync(|_| Ok(json!({"calls": 3}))))
            .with(ToolBuilder::new("boom").asynchronous(|_| async { Err("kaput".to_string()) }));
        ProtocolEngine::new(tools)
    }

    fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, params)
    }

    #[tokio::test]
    async fn test_initialize() {
        let resp = engine().handle(request(1, "initialize", None)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "agentbridge");
    }

    #[tokio::test]
    async fn test_list_tools_in_registration_order() {
        let engine = engine();
        let first = engine.handle(request(1, "tools/list", None)).await;
        engine
            .handle(request(2, "tools/call", Some(json!({"name": "stats"}))))
            .await;
        let second = engine.handle(request(3, "tools/list", None)).await;

        let tools = first.result.clone().unwrap()["tools"].clone();
        let names: Vec<_> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["greeting", "stats", "boom"]);
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["name"]));
        assert_eq!(first.result, second.result);
    }

    #[tokio::test]
    async fn test_call_tool_text_and_json_blocks() {
        let engine = engine();
        let resp = engine
            .handle(request(
                5,
                "tools/call",
                Some(json!({"name": "greeting", "arguments": {"name": "Bob"}})),
            ))
            .await;
        assert_eq!(resp.id, Some(RequestId::Number(5)));
        assert_eq!(
            resp.result.unwrap(),
            json!({"content": [{"type": "text", "text": "Hello Bob!"}]})
        );

        let resp = engine
            .handle(request(6, "tools/call", Some(json!({"name": "stats"}))))
            .await;
        assert_eq!(resp.result.unwrap()["content"][0]["json"]["calls"], 3);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let resp = engine()
            .handle(request(9, "tools/call", Some(json!({"name": "nope"}))))
            .await;
        assert_eq!(resp.id, Some(RequestId::Number(9)));
        let error = resp.error.unwrap();
        assert_eq!(error.code, ErrorCode::UnknownTool.code());
        assert!(error.message.contains("nope"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_error_response() {
        let resp = engine()
            .handle(request(4, "tools/call", Some(json!({"name": "boom"}))))
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32002);
        assert_eq!(error.data, Some(json!("kaput")));
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_error_response() {
        let tools = ToolSet::new()
            .with(ToolBuilder::new("index").sync(|args| {
                let items = args["items"].as_array().cloned().unwrap_or_default();
                Ok(items[5].clone())
            }))
            .with(ToolBuilder::new("abort").asynchronous(|args| async move {
                if args.get("reason").is_none() {
                    panic!("worker gave up");
                }
                Ok(Value::Null)
            }))
            .with(ToolBuilder::new("greeting").sync(|args| {
                Ok(json!(format!("Hello {}!", args["name"].as_str().unwrap_or("there"))))
            }));
        let engine = ProtocolEngine::new(tools);

        let resp = engine
            .handle(request(
                5,
                "tools/call",
                Some(json!({"name": "index", "arguments": {"items": []}})),
            ))
            .await;
        assert_eq!(resp.id, Some(RequestId::Number(5)));
        let error = resp.error.unwrap();
        assert_eq!(error.code, ErrorCode::ToolExecutionFailed.code());
        let data = error.data.unwrap();
        assert!(data.as_str().unwrap().contains("index out of bounds"));

        let resp = engine
            .handle(request(6, "tools/call", Some(json!({"name": "abort"}))))
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32002);
        assert_eq!(error.data, Some(json!("Tool panicked: worker gave up")));

        // The engine keeps serving after a panic.
        let resp = engine
            .handle(request(
                7,
                "tools/call",
                Some(json!({"name": "greeting", "arguments": {"name": "Ann"}})),
            ))
            .await;
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn test_method_not_found_and_invalid_params() {
        let engine = engine();
        let resp = engine.handle(request(1, "resources/list", None)).await;
        assert_eq!(resp.error.unwrap().code, -32601);

        let resp = engine.handle(request(2, "tools/call", None)).await;
        assert_eq!(resp.error.unwrap().code, -32602);

        let resp = engine
            .handle(request(3, "tools/call", Some(json!({"arguments": {}}))))
            .await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_ping() {
        let resp = engine().handle(request(1, "ping", None)).await;
        assert_eq!(resp.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_payload_preserves_string_id() {
        let dispatch = engine()
            .handle_payload(br#"{"jsonrpc":"2.0","id":"abc","method":"tools/list"}"#)
            .await;
        assert_eq!(dispatch.status_code(), 200);
        assert_eq!(
            dispatch.response().unwrap().id,
            Some(RequestId::String("abc".to_string()))
        );
    }

    #[tokio::test]
    async fn test_payload_notification_is_accepted() {
        let dispatch = engine()
            .handle_payload(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert_eq!(dispatch, Dispatch::Accepted);
        assert_eq!(dispatch.status_code(), 202);
        assert!(dispatch.body().is_empty());
    }

    #[tokio::test]
    async fn test_payload_rejects_garbage() {
        let dispatch = engine().handle_payload(b"{not json").await;
        assert_eq!(dispatch.status_code(), 400);
        let resp = dispatch.response().unwrap();
        assert_eq!(resp.id, None);
        assert_eq!(resp.error.as_ref().unwrap().code, -32700);

        let dispatch = engine().handle_payload(br#"{"jsonrpc":"2.0"}"#).await;
        assert_eq!(dispatch.response().unwrap().error.as_ref().unwrap().code, -32600);

        let dispatch = engine().handle_payload(b"[]").await;
        assert_eq!(dispatch.status_code(), 400);
    }

    #[tokio::test]
    async fn test_payload_batch_in_order() {
        let dispatch = engine()
            .handle_payload(
                br#"[
                    {"jsonrpc":"2.0","id":1,"method":"ping"},
                    {"jsonrpc":"2.0","method":"notifications/initialized"},
                    {"jsonrpc":"2.0","id":2,"method":"tools/list"},
                    {"jsonrpc":"2.0"}
                ]"#,
            )
            .await;
        match dispatch {
            Dispatch::Batch(replies) => {
                assert_eq!(replies.len(), 3);
                assert_eq!(replies[0].id, Some(RequestId::Number(1)));
                assert_eq!(replies[1].id, Some(RequestId::Number(2)));
                assert_eq!(replies[2].error.as_ref().unwrap().code, -32600);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }
}
