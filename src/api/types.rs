//! API request and response types

use serde::Serialize;

/// Result of processing one inbound message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Whether the turn completed without error (a reply was sent either way)
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
