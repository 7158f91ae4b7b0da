//! External capability interfaces.
//!
//! The core consumes four collaborators, each behind a typed async trait:
//! text embedding, SQL text generation, SQL execution, and schema metadata
//! discovery. The orchestrator dispatches through this closed set of
//! operations - there is no dynamic tool selection at runtime.
//!
//! Every call is expected to be wrapped in [`with_timeout`]; a timeout is a
//! transient failure and consumes a retry attempt like any validation
//! failure.

pub mod gemini;
pub mod mysql;
pub mod prompts;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors from external capability calls.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("{capability} call timed out after {seconds}s")]
    Timeout {
        capability: &'static str,
        seconds: u64,
    },

    #[error("{capability} transport error: {detail}")]
    Transport {
        capability: &'static str,
        detail: String,
    },

    #[error("{capability} returned a malformed response: {detail}")]
    Protocol {
        capability: &'static str,
        detail: String,
    },

    #[error("database error: {detail}")]
    Database { detail: String },

    #[error("{capability} is not configured: {detail}")]
    NotConfigured {
        capability: &'static str,
        detail: String,
    },
}

impl CapabilityError {
    /// Transient failures (timeouts, refused connections) are retried under
    /// the same attempt budget as validation failures. Database errors are
    /// not transient - they feed back into regeneration instead.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityError::Timeout { .. } | CapabilityError::Transport { .. }
        )
    }
}

/// Rows returned by SQL execution, column-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Compact text rendering used in summarization prompts and as the
    /// degraded answer when summarization itself is unavailable.
    pub fn render_compact(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }
        let mut lines = vec![self.columns.join(" | ")];
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Null => "NULL".to_string(),
                    other => other.to_string(),
                })
                .collect();
            lines.push(cells.join(" | "));
        }
        if self.rows.len() > max_rows {
            lines.push(format!("... ({} rows total)", self.rows.len()));
        }
        lines.join("\n")
    }
}

/// Structured input for one SQL generation attempt. Feedback from failed
/// attempts accumulates - attempt N sees everything attempts 1..N-1 learned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub question: String,
    /// Recent (question, answer) pairs from the same session, oldest first.
    pub history: Vec<(String, String)>,
    pub schema_context: String,
    pub join_clause: String,
    pub feedback: Vec<String>,
    pub attempt: u8,
    pub row_limit: u32,
}

/// Text to fixed-dimension vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;
}

/// Context to SQL text, plus final-answer synthesis.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, request: &GenerationRequest) -> Result<String, CapabilityError>;

    async fn summarize_answer(
        &self,
        question: &str,
        rows: &QueryRows,
    ) -> Result<String, CapabilityError>;
}

/// SQL text to rows. Runs once, returns rows or an error; no transactional
/// assumptions beyond that.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CapabilityError>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), CapabilityError>;
}

/// Schema metadata discovery, consumed at startup and on explicit reload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn fetch(&self) -> Result<crate::schema_catalog::SchemaMetadata, CapabilityError>;
}

/// Bound an external call with the configured timeout.
pub async fn with_timeout<T, F>(
    capability: &'static str,
    seconds: u64,
    fut: F,
) -> Result<T, CapabilityError>
where
    F: std::future::Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability,
            seconds,
        }),
    }
}
