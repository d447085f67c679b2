//! Tool registries used across the workspace tests.

use agentbridge_mcp::{ToolBuilder, ToolRegistry, ToolSet};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn name_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "name": { "type": "string" } },
        "required": ["name"]
    })
}

/// The `greeting` tool: `{"name": "Bob"}` → `"Hello Bob!"`.
pub fn greeting_tool() -> agentbridge_mcp::ServerTool {
    ToolBuilder::new("greeting")
        .description("Greet someone by name")
        .input_schema(name_schema())
        .sync(|args| {
            let name = args
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| "missing required argument: name".to_string())?;
            Ok(Value::String(format!("Hello {name}!")))
        })
}

/// Registry with only the greeting tool.
pub fn greeting_registry() -> ToolRegistry {
    ToolRegistry::from_tools(ToolSet::new().with(greeting_tool()))
}

/// Registry whose `counter` tool returns how often it was called on the
/// current engine. The returned handle counts how many engines were built.
pub fn counter_registry() -> (ToolRegistry, Arc<AtomicUsize>) {
    let engines = Arc::new(AtomicUsize::new(0));
    let built = engines.clone();

    let registry = ToolRegistry::new(move || {
        built.fetch_add(1, Ordering::SeqCst);
        let calls = Arc::new(AtomicUsize::new(0));
        ToolSet::new().with(
            ToolBuilder::new("counter")
                .description("Count calls on this engine")
                .sync(move |_| Ok(json!(calls.fetch_add(1, Ordering::SeqCst) + 1))),
        )
    });

    (registry, engines)
}

/// Registry with tools `a`, `b` and `fail`. Every call appends the tool name
/// to the returned log, so tests can assert invocation order.
pub fn call_log_registry() -> (ToolRegistry, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));

    let logged = |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
        ToolBuilder::new(name)
            .description(format!("Record a call to {name}"))
            .asynchronous(move |_| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(name.to_string());
                    Ok(Value::String(format!("{name} done")))
                }
            })
    };

    let fail_log = log.clone();
    let tools = ToolSet::new()
        .with(logged("a", log.clone()))
        .with(logged("b", log.clone()))
        .with(ToolBuilder::new("fail").sync(move |_| {
            fail_log.lock().unwrap().push("fail".to_string());
            Err("tool exploded".to_string())
        }));

    (ToolRegistry::from_tools(tools), log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbridge_mcp::{LocalTransport, ToolClient};

    #[tokio::test]
    async fn test_greeting() {
        let client = ToolClient::new(LocalTransport::new(greeting_registry()));
        let result = client.call_tool("greeting", json!({"name": "Bob"})).await.unwrap();
        assert_eq!(result.text(), "Hello Bob!");
    }

    #[tokio::test]
    async fn test_counter_is_per_engine() {
        let (registry, engines) = counter_registry();
        let client = ToolClient::new(LocalTransport::new(registry));

        for _ in 0..3 {
            let result = client.call_tool("counter", json!({})).await.unwrap();
            assert_eq!(result.text(), "1");
        }
        assert_eq!(engines.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_log_records_order() {
        let (registry, log) = call_log_registry();
        let client = ToolClient::new(LocalTransport::new(registry));

        client.call_tool("b", json!({})).await.unwrap();
        client.call_tool("a", json!({})).await.unwrap();
        assert!(client.call_tool("fail", json!({})).await.is_err());

        assert_eq!(*log.lock().unwrap(), vec!["b", "a", "fail"]);
    }
}
