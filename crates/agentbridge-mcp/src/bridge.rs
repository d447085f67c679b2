//! Stateless bridge from serverless events to the protocol engine.
//!
//! Every event gets a brand-new engine built from the registry. The engine
//! writes its captured response into one end of a oneshot channel and the
//! bridge drains the other end, then the engine is dropped. Nothing survives
//! between invocations.
//!
//! Inbound events look like `{"body": "<json>"}` (optionally with
//! `isBase64Encoded`), `{"body": {...}}`, or are the JSON-RPC payload itself.

use crate::engine::{Dispatch, ProtocolEngine};
use crate::protocol::{DecodeError, ErrorCode, JsonRpcError, JsonRpcResponse, Message};
use crate::registry::ToolRegistry;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Serverless response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl Envelope {
    fn json(status_code: u16, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn from_dispatch(dispatch: &Dispatch) -> Self {
        Self::json(dispatch.status_code(), dispatch.body())
    }

    fn error(status_code: u16, error: JsonRpcError) -> Self {
        Self::from_dispatch(&Dispatch::Rejected(JsonRpcResponse::failure(None, error)))
            .with_status(status_code)
    }

    fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }
}

/// Why an event could not be turned into a payload.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event body is empty")]
    MissingBody,

    #[error("Event body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl EventError {
    fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            EventError::Decode(e) => e.to_rpc_error(),
            other => JsonRpcError::new(ErrorCode::ParseError, other.to_string()),
        }
    }
}

/// Decoded inbound payload.
#[derive(Debug)]
enum Inbound {
    Single(Message),
    Batch(Value),
}

/// Extract and decode the JSON-RPC payload carried by an event.
fn decode_event(event: Value) -> Result<Inbound, EventError> {
    let payload = match event {
        Value::Object(mut obj) if obj.contains_key("body") => {
            let encoded = obj
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            match obj.remove("body") {
                Some(Value::String(body)) if encoded => {
                    let bytes = base64::engine::general_purpose::STANDARD.decode(body.trim())?;
                    serde_json::from_slice(&bytes).map_err(DecodeError::from)?
                }
                Some(Value::String(body)) => {
                    serde_json::from_str(&body).map_err(DecodeError::from)?
                }
                Some(Value::Null) | None => return Err(EventError::MissingBody),
                Some(body) => body,
            }
        }
        other => other,
    };

    match payload {
        Value::Array(_) => Ok(Inbound::Batch(payload)),
        single => Ok(Inbound::Single(Message::from_value(single)?)),
    }
}

/// Run one exchange and write the result into `sink` exactly once.
async fn run_exchange(engine: ProtocolEngine, inbound: Inbound, sink: oneshot::Sender<Envelope>) {
    let dispatch = match inbound {
        Inbound::Single(message) => engine.dispatch(message).await,
        Inbound::Batch(value) => engine.handle_value(value).await,
    };
    if sink.send(Envelope::from_dispatch(&dispatch)).is_err() {
        warn!("Bridge capture closed before the response was written");
    }
}

/// Handle one serverless event against a fresh engine.
pub async fn handle_event(registry: &ToolRegistry, event: Value) -> Envelope {
    let inbound = match decode_event(event) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "Rejecting undecodable event");
            return Envelope::error(400, e.to_rpc_error());
        }
    };

    let engine = registry.engine();
    let (sink, capture) = oneshot::channel();

    debug!("Dispatching bridged exchange");
    run_exchange(engine, inbound, sink).await;

    match capture.await {
        Ok(envelope) => {
            debug!(status = envelope.status_code, "Bridged exchange finished");
            envelope
        }
        Err(_) => {
            warn!("Engine finished without writing a response");
            Envelope::error(
                500,
                JsonRpcError::new(ErrorCode::InternalError, "No response captured"),
            )
        }
    }
}

/// Handle an event given as raw bytes, e.g. read from stdin.
pub async fn handle_raw_event(registry: &ToolRegistry, bytes: &[u8]) -> Envelope {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(event) => handle_event(registry, event).await,
        Err(e) => {
            warn!(error = %e, "Rejecting event that is not JSON");
            Envelope::error(400, DecodeError::from(e).to_rpc_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ToolBuilder, ToolSet};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn greeting_registry() -> ToolRegistry {
        ToolRegistry::from_tools(
            ToolSet::new().with(
                ToolBuilder::new("greeting")
                    .description("Greet someone")
                    .input_schema(json!({
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }))
                    .sync(|args| {
                        let name = args["name"].as_str().unwrap_or_default();
                        Ok(json!(format!("Hello {name}!")))
                    }),
            ),
        )
    }

    fn body_json(envelope: &Envelope) -> Value {
        serde_json::from_str(&envelope.body).unwrap()
    }

    #[tokio::test]
    async fn test_tools_list_from_string_body() {
        let event = json!({"body": r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#});
        let envelope = handle_event(&greeting_registry(), event).await;

        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.headers["content-type"], "application/json");
        let body = body_json(&envelope);
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["tools"][0]["name"], "greeting");
        assert_eq!(body["result"]["tools"][0]["description"], "Greet someone");
        assert_eq!(
            body["result"]["tools"][0]["inputSchema"]["properties"]["name"]["type"],
            "string"
        );
    }

    #[tokio::test]
    async fn test_object_body_and_raw_event() {
        let call = json!({
            "jsonrpc": "2.0",
            "id": "c1",
            "method": "tools/call",
            "params": {"name": "greeting", "arguments": {"name": "Bob"}}
        });

        let wrapped = handle_event(&greeting_registry(), json!({"body": call.clone()})).await;
        let raw = handle_event(&greeting_registry(), call).await;
        assert_eq!(wrapped, raw);

        let body = body_json(&raw);
        assert_eq!(body["id"], "c1");
        assert_eq!(body["result"]["content"][0]["text"], "Hello Bob!");
    }

    #[tokio::test]
    async fn test_base64_body() {
        let payload = r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
        let event = json!({
            "body": base64::engine::general_purpose::STANDARD.encode(payload),
            "isBase64Encoded": true
        });
        let envelope = handle_event(&greeting_registry(), event).await;
        assert_eq!(envelope.status_code, 200);
        assert_eq!(body_json(&envelope)["result"], json!({}));
    }

    #[tokio::test]
    async fn test_undecodable_event_never_builds_engine() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let registry = ToolRegistry::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ToolSet::new()
        });

        let envelope = handle_event(&registry, json!({"body": "{not json"})).await;
        assert_eq!(envelope.status_code, 400);
        assert_eq!(body_json(&envelope)["error"]["code"], -32700);

        let envelope = handle_event(&registry, json!({"body": r#"{"id": 1}"#})).await;
        assert_eq!(envelope.status_code, 400);
        assert_eq!(body_json(&envelope)["error"]["code"], -32600);

        let envelope = handle_event(&registry, json!({"body": null})).await;
        assert_eq!(envelope.status_code, 400);

        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_counter_state_does_not_survive_invocations() {
        let registry = ToolRegistry::new(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            ToolSet::new().with(ToolBuilder::new("counter").sync(move |_| {
                Ok(json!(calls.fetch_add(1, Ordering::SeqCst) + 1))
            }))
        });
        let event = json!({"body": {
            "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "counter"}
        }});

        for _ in 0..2 {
            let envelope = handle_event(&registry, event.clone()).await;
            assert_eq!(body_json(&envelope)["result"]["content"][0]["json"], 1);
        }
    }

    #[tokio::test]
    async fn test_notification_is_accepted_with_empty_body() {
        let event = json!({"body": {"jsonrpc": "2.0", "method": "notifications/initialized"}});
        let envelope = handle_event(&greeting_registry(), event).await;
        assert_eq!(envelope.status_code, 202);
        assert!(envelope.body.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_through_bridge() {
        let event = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}
        });
        let envelope = handle_event(&greeting_registry(), event).await;
        assert_eq!(envelope.status_code, 200);
        let body = body_json(&envelope);
        assert_eq!(body["id"], 3);
        assert_eq!(body["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn test_panicking_tool_still_yields_envelope() {
        let registry = ToolRegistry::from_tools(ToolSet::new().with(
            ToolBuilder::new("fifth").sync(|args| {
                let items = args["items"].as_array().cloned().unwrap_or_default();
                Ok(items[5].clone())
            }),
        ));
        let event = json!({"body": {
            "jsonrpc": "2.0", "id": 8, "method": "tools/call",
            "params": {"name": "fifth", "arguments": {"items": [1, 2]}}
        }});

        let envelope = tokio::spawn(async move { handle_event(&registry, event).await })
            .await
            .unwrap();
        assert_eq!(envelope.status_code, 200);
        let body = body_json(&envelope);
        assert_eq!(body["id"], 8);
        assert_eq!(body["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn test_raw_event_bytes() {
        let envelope = handle_raw_event(&greeting_registry(), b"garbage").await;
        assert_eq!(envelope.status_code, 400);

        let envelope = handle_raw_event(
            &greeting_registry(),
            br#"{"body":"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}"}"#,
        )
        .await;
        assert_eq!(envelope.status_code, 200);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::from_dispatch(&Dispatch::Accepted);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["statusCode"], 202);
        assert_eq!(value["body"], "");
        assert!(value["headers"].is_object());
    }
}
