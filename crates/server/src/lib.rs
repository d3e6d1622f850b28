//! Counseling Assistant Server
//!
//! Provides WebSocket and HTTP endpoints for the counselor, plus the shared
//! startup pieces used by the REPL and evaluation binaries.

pub mod http;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use logging::{init_tracing, LogOutput};
pub use metrics::{init_metrics, metrics_handler};
pub use session::{AgentFactory, Outbound, Session, SessionChannel, SessionManager};
pub use state::{counselor_factory, AppState, Services};
pub use websocket::{WsMessage, WsParams};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Timeout(_) => axum::http::StatusCode::GATEWAY_TIMEOUT,
            ServerError::Agent(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Startup(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<chia_agent::AgentError> for ServerError {
    fn from(err: chia_agent::AgentError) -> Self {
        match err {
            chia_agent::AgentError::Conversation(message) => ServerError::InvalidRequest(message),
            other => ServerError::Agent(other.to_string()),
        }
    }
}

impl From<chia_core::Error> for ServerError {
    fn from(err: chia_core::Error) -> Self {
        ServerError::Startup(err.to_string())
    }
}
