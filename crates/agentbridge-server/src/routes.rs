//! HTTP routes for the agent host.

use crate::state::AppState;
use crate::tools::inquire_registry;
use agentbridge_mcp::{create_mcp_router, McpHttpConfig, McpHttpState};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Create the router with the agent routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/inquire", post(inquire))
        .route("/invocations", post(invocations))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Agent routes plus an MCP endpoint exposing the agent as the `inquire` tool.
pub fn create_router_with_mcp(state: AppState, mcp: McpHttpConfig) -> Router {
    let registry = inquire_registry(state.agent.clone());
    create_router(state).merge(create_mcp_router(McpHttpState::new(registry, mcp)))
}

/// Serve `router` on an already bound listener until it fails.
pub async fn serve(listener: tokio::net::TcpListener, router: Router) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Agent host listening");
    axum::serve(listener, router).await
}

// =============================================================================
// Request/response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct InquiryRequest {
    #[serde(alias = "prompt")]
    question: String,
}

#[derive(Debug, Serialize)]
struct InvocationResponse {
    result: String,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: String,
}

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "BAD_REQUEST")))
    }

    fn internal(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(msg, "INTERNAL_ERROR")),
        )
    }
}

fn question_of(request: &InquiryRequest) -> Result<&str, (StatusCode, Json<ApiError>)> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("question must not be empty"));
    }
    Ok(question)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Liveness probe of the hosted agent runtime contract.
async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "Healthy" }))
}

/// Stream the answer as plain text while the agent produces it.
///
/// The status is sent before the run starts, so a failure is reported as a
/// final `error: ...` line of the body.
async fn inquire(State(state): State<AppState>, Json(request): Json<InquiryRequest>) -> Response {
    let question = match question_of(&request) {
        Ok(q) => q.to_string(),
        Err(e) => return e.into_response(),
    };
    info!(question = %question, "Inquiry received");

    let fragments = state.agent.run(question).map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Inquiry failed");
                format!("\nerror: {e}")
            }
        })
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(fragments))
        .unwrap_or_else(|e| ApiError::internal(e.to_string()).into_response())
}

/// Hosted runtime entry point: `{"question"}` in, `{"result"}` out.
async fn invocations(
    State(state): State<AppState>,
    Json(request): Json<InquiryRequest>,
) -> Response {
    let question = match question_of(&request) {
        Ok(q) => q.to_string(),
        Err(e) => return e.into_response(),
    };

    match state.agent.ask(question).await {
        Ok(result) => Json(InvocationResponse { result }).into_response(),
        Err(e) => {
            warn!(error = %e, "Invocation failed");
            ApiError::internal(e.to_string()).into_response()
        }
    }
}
