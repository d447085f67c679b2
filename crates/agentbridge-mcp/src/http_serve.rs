//! Persistent HTTP transport for the MCP engine.
//!
//! # Endpoints
//!
//! - `POST /mcp` - one JSON-RPC frame (or batch) per HTTP request, JSON reply
//! - `DELETE /mcp` - end a session (stateful mode only)
//!
//! # Session modes
//!
//! In [`SessionMode::Stateless`] every request is served by a fresh engine.
//! In [`SessionMode::Stateful`] an `initialize` request creates an engine whose
//! id is returned in the `mcp-session-id` header; later requests carrying that
//! header are routed to the same engine. Sessions that see no request for
//! [`McpHttpConfig::session_idle_timeout`] are dropped, since clients may
//! disappear without sending `DELETE /mcp`.

use crate::engine::{Dispatch, ProtocolEngine};
use crate::protocol::{DecodeError, ErrorCode, JsonRpcError, JsonRpcResponse, Message};
use crate::registry::ToolRegistry;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Header carrying the session id in stateful mode.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// How requests are mapped onto engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Fresh engine per request, no session affinity.
    #[default]
    Stateless,
    /// Engine per session, keyed by the `mcp-session-id` header.
    Stateful,
}

/// Idle time after which a stateful session is dropped.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Persistent transport configuration.
#[derive(Debug, Clone)]
pub struct McpHttpConfig {
    pub mode: SessionMode,
    /// Per-request limit. `None` disables the timeout.
    pub request_timeout: Option<Duration>,
    /// If set, clients must send this key in `X-API-Key` or
    /// `Authorization: Bearer <key>`.
    pub api_key: Option<String>,
    /// Stateful sessions idle for this long are removed.
    pub session_idle_timeout: Duration,
}

impl Default for McpHttpConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            request_timeout: None,
            api_key: None,
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }
}

impl McpHttpConfig {
    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }
}

/// One stateful session.
struct Session {
    engine: Mutex<ProtocolEngine>,
    /// Milliseconds since the state's epoch at the last request.
    last_seen_ms: AtomicU64,
}

impl Session {
    fn new(engine: ProtocolEngine, now_ms: u64) -> Self {
        Self {
            engine: Mutex::new(engine),
            last_seen_ms: AtomicU64::new(now_ms),
        }
    }

    fn touch(&self, now_ms: u64) {
        self.last_seen_ms.fetch_max(now_ms, Ordering::Relaxed);
    }
}

/// State for the MCP HTTP server.
#[derive(Clone)]
pub struct McpHttpState {
    registry: ToolRegistry,
    config: Arc<McpHttpConfig>,
    /// Active sessions (session_id -> engine). Unused in stateless mode.
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    epoch: Instant,
}

impl McpHttpState {
    pub fn new(registry: ToolRegistry, config: McpHttpConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            epoch: Instant::now(),
        }
    }

    /// Check if authentication is enabled.
    pub fn has_auth(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn mode(&self) -> SessionMode {
        self.config.mode
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Drop sessions that have been idle longer than the configured limit.
    /// Returns how many were removed.
    pub async fn evict_idle_sessions(&self) -> usize {
        let limit = u64::try_from(self.config.session_idle_timeout.as_millis()).unwrap_or(u64::MAX);
        let now = self.now_ms();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let idle = now.saturating_sub(session.last_seen_ms.load(Ordering::Relaxed));
            let keep = idle < limit;
            if !keep {
                info!(session_id = %id, idle_ms = idle, "MCP session expired");
            }
            keep
        });
        before - sessions.len()
    }

    async fn process(&self, headers: &HeaderMap, body: Bytes) -> Response {
        match self.config.mode {
            SessionMode::Stateless => {
                let engine = self.registry.engine();
                dispatch_response(engine.handle_payload(&body).await, None)
            }
            SessionMode::Stateful => {
                self.evict_idle_sessions().await;
                match session_id(headers) {
                    Some(id) => self.process_in_session(id, body).await,
                    None => self.open_session(body).await,
                }
            }
        }
    }

    async fn process_in_session(&self, id: &str, body: Bytes) -> Response {
        let session = self.sessions.read().await.get(id).cloned();
        let Some(session) = session else {
            warn!(session_id = %id, "Unknown MCP session");
            return rpc_error(StatusCode::NOT_FOUND, ErrorCode::InvalidRequest, "Session not found");
        };
        session.touch(self.now_ms());
        let dispatch = session.engine.lock().await.handle_payload(&body).await;
        session.touch(self.now_ms());
        dispatch_response(dispatch, Some(id))
    }

    async fn open_session(&self, body: Bytes) -> Response {
        let value: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                let error = DecodeError::from(e).to_rpc_error();
                return (
                    StatusCode::BAD_REQUEST,
                    Json(JsonRpcResponse::failure(None, error)),
                )
                    .into_response();
            }
        };

        let is_initialize = matches!(
            Message::from_value(value.clone()),
            Ok(Message::Request(ref r)) if r.method == "initialize"
        );
        if !is_initialize {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                "Missing mcp-session-id header",
            );
        }

        let engine = self.registry.engine();
        let dispatch = engine.handle_value(value).await;

        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(engine, self.now_ms());
        self.sessions.write().await.insert(id.clone(), Arc::new(session));
        info!(session_id = %id, "MCP session opened");

        dispatch_response(dispatch, Some(&id))
    }

    async fn close_session(&self, headers: &HeaderMap) -> StatusCode {
        if self.config.mode == SessionMode::Stateless {
            return StatusCode::METHOD_NOT_ALLOWED;
        }
        let Some(id) = session_id(headers) else {
            return StatusCode::BAD_REQUEST;
        };
        if self.sessions.write().await.remove(id).is_some() {
            info!(session_id = %id, "MCP session closed");
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn rpc_error(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    (
        status,
        Json(JsonRpcResponse::failure(None, JsonRpcError::new(code, message))),
    )
        .into_response()
}

fn dispatch_response(dispatch: Dispatch, session: Option<&str>) -> Response {
    let status = StatusCode::from_u16(dispatch.status_code()).unwrap_or(StatusCode::OK);
    let mut response = if matches!(dispatch, Dispatch::Accepted) {
        status.into_response()
    } else {
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            dispatch.body(),
        )
            .into_response()
    };

    if let Some(id) = session.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, id);
    }
    response
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract API key from request headers.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Middleware to validate the API key.
async fn api_key_auth(State(state): State<McpHttpState>, request: Request, next: Next) -> Response {
    let Some(ref expected_key) = state.config.api_key else {
        return next.run(request).await;
    };

    match extract_api_key(request.headers()) {
        Some(key) if constant_time_eq(key.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => {
            warn!("Invalid API key provided for MCP endpoint");
            rpc_error(StatusCode::UNAUTHORIZED, ErrorCode::InvalidRequest, "Invalid API key")
        }
        None => {
            warn!("Missing API key for MCP endpoint");
            rpc_error(
                StatusCode::UNAUTHORIZED,
                ErrorCode::InvalidRequest,
                "Authentication required",
            )
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the MCP HTTP router, serving `/mcp` and `/mcp/`.
pub fn create_mcp_router(state: McpHttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::HeaderName::from_static(SESSION_HEADER)]);

    let router = Router::new()
        .route("/mcp", post(mcp_post).delete(mcp_delete))
        .route("/mcp/", post(mcp_post).delete(mcp_delete));

    let router = if state.has_auth() {
        info!("MCP API key authentication enabled");
        router.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api_key_auth,
        ))
    } else {
        router
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the MCP router on an already bound listener until it fails.
///
/// In stateful mode a background task also sweeps idle sessions, so they
/// expire even when no further requests arrive.
pub async fn serve(listener: tokio::net::TcpListener, state: McpHttpState) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), mode = ?state.mode(), "MCP HTTP transport listening");

    let sweeper = (state.mode() == SessionMode::Stateful).then(|| {
        let state = state.clone();
        let period = state.config.session_idle_timeout.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                state.evict_idle_sessions().await;
            }
        })
    });

    let result = axum::serve(listener, create_mcp_router(state)).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result
}

async fn mcp_post(State(state): State<McpHttpState>, headers: HeaderMap, body: Bytes) -> Response {
    debug!(bytes = body.len(), "MCP request received");
    match state.config.request_timeout {
        Some(limit) => match tokio::time::timeout(limit, state.process(&headers, body)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "MCP request timed out");
                rpc_error(
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorCode::InternalError,
                    "Request timed out",
                )
            }
        },
        None => state.process(&headers, body).await,
    }
}

async fn mcp_delete(State(state): State<McpHttpState>, headers: HeaderMap) -> StatusCode {
    state.close_session(&headers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ToolBuilder, ToolSet};
    use axum::body::Body;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn counting_registry() -> ToolRegistry {
        ToolRegistry::new(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            ToolSet::new()
                .with(ToolBuilder::new("counter").sync(move |_| {
                    Ok(json!(calls.fetch_add(1, Ordering::SeqCst) + 1))
                }))
                .with(ToolBuilder::new("slow").asynchronous(|_| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(json!("done"))
                }))
        })
    }

    fn post_json(body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn call(id: i64, tool: &str) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": {"name": tool}})
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k1"));
        assert_eq!(extract_api_key(&headers), Some("k1"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer k2 "));
        assert_eq!(extract_api_key(&headers), Some("k2"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_api_key(&headers), None);
    }

    #[tokio::test]
    async fn test_stateless_fresh_engine_per_request() {
        let router = create_mcp_router(McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default(),
        ));

        for id in 1..=2 {
            let response = router
                .clone()
                .oneshot(post_json(call(id, "counter"), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(SESSION_HEADER).is_none());
            let body = json_body(response).await;
            assert_eq!(body["id"], id);
            assert_eq!(body["result"]["content"][0]["json"], 1);
        }
    }

    #[tokio::test]
    async fn test_notification_and_garbage() {
        let router = create_mcp_router(McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default(),
        ));

        let response = router
            .clone()
            .oneshot(post_json(
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/mcp/")
            .body(Body::from("{oops"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_stateful_session_lifecycle() {
        let state = McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default().with_mode(SessionMode::Stateful),
        );
        let router = create_mcp_router(state.clone());

        // Requests without a session must start with initialize.
        let response = router.clone().oneshot(post_json(call(1, "counter"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let response = router.clone().oneshot(post_json(init, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(state.session_count().await, 1);

        for expected in 1..=2 {
            let response = router
                .clone()
                .oneshot(post_json(call(expected + 1, "counter"), Some(&session)))
                .await
                .unwrap();
            let body = json_body(response).await;
            assert_eq!(body["result"]["content"][0]["json"], expected);
        }

        let delete = axum::http::Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.session_count().await, 0);

        let response = router.oneshot(post_json(call(9, "counter"), Some(&session))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_idle_session_is_evicted() {
        let state = McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default()
                .with_mode(SessionMode::Stateful)
                .with_session_idle_timeout(Duration::from_millis(50)),
        );
        let router = create_mcp_router(state.clone());
        let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});

        let response = router.clone().oneshot(post_json(init.clone(), None)).await.unwrap();
        let stale = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        assert_eq!(state.session_count().await, 1);

        tokio::time::sleep(Duration::from_millis(120)).await;

        // The next request sweeps the abandoned session.
        let response = router.clone().oneshot(post_json(init, None)).await.unwrap();
        let fresh = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        assert_ne!(fresh, stale);
        assert_eq!(state.session_count().await, 1);

        let response = router
            .clone()
            .oneshot(post_json(call(2, "counter"), Some(&stale)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.oneshot(post_json(call(3, "counter"), Some(&fresh))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_active_session_is_kept() {
        let state = McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default()
                .with_mode(SessionMode::Stateful)
                .with_session_idle_timeout(Duration::from_secs(60)),
        );
        let router = create_mcp_router(state.clone());
        let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        router.oneshot(post_json(init, None)).await.unwrap();

        assert_eq!(state.evict_idle_sessions().await, 0);
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_not_allowed_when_stateless() {
        let router = create_mcp_router(McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default(),
        ));
        let delete = axum::http::Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_HEADER, "abc")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let router = create_mcp_router(McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default().with_request_timeout(Duration::from_millis(20)),
        ));
        let response = router.oneshot(post_json(call(1, "slow"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn test_api_key_gate() {
        let router = create_mcp_router(McpHttpState::new(
            counting_registry(),
            McpHttpConfig::default().with_api_key("sekret"),
        ));
        let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});

        let response = router.clone().oneshot(post_json(ping.clone(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = post_json(ping.clone(), None);
        request
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("wrong"));
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = post_json(ping, None);
        request
            .headers_mut()
            .insert("authorization", HeaderValue::from_static("Bearer sekret"));
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
