//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ErrorResponse, HealthResponse, MessageResponse};
use super::AppState;
use crate::runtime::DispatchError;
use crate::state_machine::IncomingMessage;
use crate::store::UserId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Longest message text accepted, matching the chat platform's limit
const MAX_TEXT_CHARS: usize = 4096;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound messages and button presses
        .route("/api/messages", post(post_message))
        // Outgoing messages for one user
        .route("/api/users/:id/stream", get(stream_user))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Messages
// ============================================================

async fn post_message(
    State(state): State<AppState>,
    Json(msg): Json<IncomingMessage>,
) -> Result<Json<MessageResponse>, AppError> {
    if msg.text.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::BadRequest(format!(
            "Message text exceeds {MAX_TEXT_CHARS} characters"
        )));
    }

    match state.dispatcher.process_message(&msg).await {
        Ok(()) => Ok(Json(MessageResponse {
            handled: true,
            error: None,
        })),
        // No reply reached the user
        Err(e @ DispatchError::Send(_)) => Err(AppError::Internal(e.to_string())),
        Err(e) => Ok(Json(MessageResponse {
            handled: false,
            error: Some(e.to_string()),
        })),
    }
}

async fn stream_user(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let user_id = UserId(id);
    tracing::info!(user_id = %user_id, "Event stream opened");
    sse_stream(user_id, state.messenger.subscribe())
}

// ============================================================
// Service info
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_version() -> &'static str {
    concat!("spendbot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
