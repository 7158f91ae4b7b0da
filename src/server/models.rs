//! HTTP request and response bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Omitted on the first message; the server mints one and returns it.
    #[serde(default)]
    pub session_id: Option<String>,
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    /// The executed statement; absent when the turn ended in clarification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub tables: Vec<String>,
    pub attempts: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: &'static str,
    pub database: &'static str,
    pub tables: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadResponse {
    pub tables: usize,
    pub join_edges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
