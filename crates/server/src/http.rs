//! HTTP Endpoints
//!
//! REST API for the counselor.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chia_core::ConversationTurn;
use chia_tools::ToolExecutor;

use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.settings.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let ws_path = server.ws_path.clone();

    Router::new()
        .route("/send_message", post(send_message))
        .route("/history/:user_id", get(get_history))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name", post(call_tool))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(&ws_path, get(ws_handler))
        .layer(axum::middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// Disabled CORS allows everything; no valid origins falls back to
/// localhost:3000.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    let localhost = || {
        CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };

    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return localhost();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        return localhost();
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Chat request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub user_id: String,
    pub message: String,
}

/// Chat response
#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub response: String,
}

/// `POST /send_message`
///
/// Sessions created here have no interactive channel, so the risk
/// assessment tool reports that it is unavailable.
async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, StatusCode> {
    let session = state
        .sessions
        .get_or_create(&request.user_id)
        .map_err(StatusCode::from)?;
    session.touch();

    let timeout = state.request_timeout();
    let reply = match tokio::time::timeout(timeout, session.agent.process(&request.message)).await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            tracing::error!(user_id = %request.user_id, error = %e, "Chat error");
            return Err(ServerError::from(e).into());
        },
        Err(_) => {
            tracing::warn!(user_id = %request.user_id, "Chat request timed out");
            return Err(ServerError::Timeout(timeout.as_secs()).into());
        },
    };

    Ok(Json(SendMessageResponse {
        response: reply.text,
    }))
}

/// History response
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<ConversationTurn>,
}

/// `GET /history/:user_id`
async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let session = state.sessions.get(&user_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(HistoryResponse {
        history: session.agent.history(),
    }))
}

/// List tools
async fn list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools: Vec<serde_json::Value> = state
        .tools
        .list_tools()
        .into_iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema.to_value(),
            })
        })
        .collect();

    Json(serde_json::json!({
        "tools": tools,
    }))
}

/// Tool call request
#[derive(Debug, Deserialize)]
struct ToolCallRequest {
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Call tool
async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ToolCallRequest>,
) -> Json<serde_json::Value> {
    let arguments = if request.arguments.is_null() {
        serde_json::json!({})
    } else {
        request.arguments
    };

    match state.tools.execute(&name, arguments).await {
        Ok(output) => Json(serde_json::json!({
            "content": output.content,
            "is_error": output.is_error,
        })),
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "Tool call failed");
            Json(serde_json::json!({
                "content": [{ "type": "text", "text": e.message }],
                "is_error": true,
            }))
        },
    }
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tool_count = state.tools.len();

    Json(serde_json::json!({
        "status": if tool_count > 0 { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "tools": { "status": if tool_count > 0 { "ok" } else { "degraded" }, "count": tool_count },
            "sessions": { "status": "ok", "count": state.sessions.count() },
        }
    }))
}

/// Readiness check including LLM backend connectivity
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm_status = match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        state.llm.is_available(),
    )
    .await
    {
        Ok(true) => "ok",
        Ok(false) => "unreachable",
        Err(_) => "timeout",
    };
    let ready = llm_status == "ok";

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "sessions": { "status": "ok", "count": state.sessions.count() },
                "llm_backend": { "status": llm_status, "model": state.llm.model_name() },
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::echo_factory;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chia_config::Settings;
    use chia_core::{GenerateRequest, GenerateResponse, LanguageModel, ToolDefinition};
    use chia_tools::{InputSchema, PropertySchema, Tool, ToolError, ToolOutput, ToolRegistry, ToolSchema};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct OfflineLlm;

    #[async_trait]
    impl LanguageModel for OfflineLlm {
        async fn generate(&self, _request: GenerateRequest) -> chia_core::Result<GenerateResponse> {
            Err(chia_core::Error::Llm("offline".to_string()))
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> chia_core::Result<GenerateResponse> {
            self.generate(request).await
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn model_name(&self) -> &str {
            "offline"
        }
    }

    struct ZipTool;

    #[async_trait]
    impl Tool for ZipTool {
        fn name(&self) -> &str {
            "search_provider"
        }

        fn description(&self) -> &str {
            "Echoes the ZIP code"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: InputSchema::object().property(
                    "zip_code",
                    PropertySchema::string("ZIP code"),
                    true,
                ),
            }
        }

        async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(input["zip_code"].as_str().unwrap_or_default()))
        }
    }

    fn app() -> Router {
        let mut tools = ToolRegistry::new();
        tools.register(ZipTool);
        let state = AppState::with_parts(
            Settings::default(),
            Arc::new(OfflineLlm),
            tools,
            echo_factory(),
        );
        create_router(state)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_then_history() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/send_message",
                serde_json::json!({"user_id": "alice", "message": "What is PrEP?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["response"], "echo What is PrEP?");

        let response = app
            .oneshot(Request::get("/history/alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["message"], "How can I help you?");
        assert_eq!(history[1]["sender"], "patient");
        assert_eq!(history[2]["receiver"], "patient");
        assert!(history[2]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_http_session_has_no_assessment_channel() {
        let response = app()
            .oneshot(post_json(
                "/send_message",
                serde_json::json!({"user_id": "bob", "message": "assess"}),
            ))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert!(body["response"].as_str().unwrap().starts_with("answered unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_history() {
        let response = app()
            .oneshot(Request::get("/history/nobody").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_user_id_rejected() {
        let response = app()
            .oneshot(post_json(
                "/send_message",
                serde_json::json!({"user_id": "", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tools_endpoints() {
        let app = app();

        let response = app
            .clone()
            .oneshot(Request::get("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["tools"][0]["name"], "search_provider");
        assert_eq!(body["tools"][0]["input_schema"]["required"][0], "zip_code");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/tools/search_provider",
                serde_json::json!({"arguments": {"zip_code": "02906"}}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["is_error"], false);
        assert_eq!(body["content"][0]["text"], "02906");

        let response = app
            .oneshot(post_json("/api/tools/search_provider", serde_json::json!({})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["is_error"], true);
        assert_eq!(body["content"][0]["text"], "zip_code is required");
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let app = app();

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["checks"]["tools"]["count"], 1);

        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json_body(response).await["checks"]["llm_backend"]["status"],
            "unreachable"
        );
    }
}
