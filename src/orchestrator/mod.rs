//! Turn orchestration.
//!
//! One user message drives a bounded pipeline: retrieve candidate tables,
//! resolve the join path, generate SQL, validate it, execute it, validate
//! the result, respond. Every recoverable failure (rejected statement,
//! database error, anomalous result, transient upstream failure) feeds a
//! message back into the next generation attempt; one shared attempt budget
//! bounds the whole turn. The pipeline is a fixed dispatch sequence over the
//! capability traits, not an open-ended tool loop.

pub mod attempt;
pub mod errors;

pub use attempt::AttemptTracker;
pub use errors::TurnError;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::capabilities::{
    prompts, CapabilityError, GenerationRequest, SqlExecutor, SqlGenerator, TextEmbedder,
};
use crate::config::ServerConfig;
use crate::guardrails;
use crate::schema_catalog::{SchemaCatalog, SchemaCatalogError};
use crate::session::{Exchange, TurnGuard};

/// How many prior exchanges from the session are shown to the generator.
const HISTORY_WINDOW: usize = 5;

/// How a turn concluded when it did produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A validated answer backed by executed SQL.
    Answer,
    /// The result budget ran out with an anomaly outstanding; the answer is
    /// delivered with a confidence caveat.
    BestEffort,
    /// Retrieval found nothing relevant; the answer asks the user to
    /// rephrase. No SQL was generated.
    Clarification,
}

/// Successful conclusion of one turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub sql: Option<String>,
    pub tables: Vec<String>,
    pub attempts: u8,
    pub kind: OutcomeKind,
}

pub struct Orchestrator {
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn SqlExecutor>,
    retrieval_k: usize,
    min_score: f32,
    max_attempts: u8,
    row_limit: u32,
}

impl Orchestrator {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn SqlExecutor>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            executor,
            retrieval_k: config.retrieval_k,
            min_score: config.min_score,
            max_attempts: config.max_attempts,
            row_limit: config.row_limit,
        }
    }

    /// Run one full turn against the given catalog snapshot. The snapshot is
    /// pinned for the whole turn; a concurrent schema reload does not affect
    /// it. Cancellation (session cleared) is checked at phase boundaries.
    pub async fn run_turn(
        &self,
        catalog: &SchemaCatalog,
        question: &str,
        history: &[Exchange],
        guard: &TurnGuard,
    ) -> Result<ChatOutcome, TurnError> {
        let mut tracker = AttemptTracker::new(self.max_attempts);

        // Phase: retrieve candidate tables.
        ensure_active(guard)?;
        let matches = self.retrieve_tables(catalog, question, &mut tracker).await?;
        if matches.is_empty() {
            log::info!("No relevant tables for question; asking for clarification");
            return Ok(ChatOutcome {
                answer: prompts::clarification_message(question),
                sql: None,
                tables: Vec::new(),
                attempts: tracker.current(),
                kind: OutcomeKind::Clarification,
            });
        }

        // Phase: resolve the join path over the candidates.
        ensure_active(guard)?;
        let mut required: BTreeSet<String> = matches.into_iter().collect();
        let plan = loop {
            match catalog.graph.resolve_join_path(&required) {
                Ok(plan) => break plan,
                Err(SchemaCatalogError::NoJoinPath { unreachable }) => {
                    // Disconnected candidates are usually retrieval noise.
                    // Drop them, tell the generator, and try again with the
                    // connected majority.
                    for table in &unreachable {
                        required.remove(table);
                    }
                    if required.is_empty() {
                        return Err(TurnError::NoJoinPath { unreachable });
                    }
                    tracker.note(format!(
                        "Ignored tables with no join path to the rest: {}",
                        unreachable.join(", ")
                    ));
                }
                Err(other) => return Err(TurnError::Catalog(other)),
            }
        };

        let tables: Vec<String> = plan.tables.iter().cloned().collect();
        let selected: Vec<String> = if tables.is_empty() {
            required.iter().cloned().collect()
        } else {
            tables
        };
        let schema_context = catalog.metadata.render_tables(&selected);
        let binary_columns = catalog.metadata.binary_id_columns(&selected);
        let join_clause = if plan.is_single_table() {
            String::new()
        } else {
            plan.join_clause()
        };
        let recent_history: Vec<(String, String)> = history
            .iter()
            .rev()
            .take(HISTORY_WINDOW)
            .rev()
            .map(|e| (e.question.clone(), e.answer.clone()))
            .collect();

        // Phases: generate, validate, execute, validate result. One budget.
        loop {
            ensure_active(guard)?;
            log::debug!("Generation attempt {}/{}", tracker.current(), self.max_attempts);
            let request = GenerationRequest {
                question: question.to_string(),
                history: recent_history.clone(),
                schema_context: schema_context.clone(),
                join_clause: join_clause.clone(),
                feedback: tracker.feedback().to_vec(),
                attempt: tracker.current(),
                row_limit: self.row_limit,
            };

            let raw = match self.generator.generate_sql(&request).await {
                Ok(raw) => raw,
                Err(e) if e.is_transient() => {
                    if tracker.register_failure(e.to_string()) {
                        continue;
                    }
                    return Err(retry_exhausted(&tracker));
                }
                Err(e) => return Err(TurnError::Upstream(e)),
            };

            let sql = match guardrails::apply_rules(&raw, self.row_limit) {
                Ok(sql) => sql,
                Err(violation) => {
                    if tracker.register_failure(violation.to_string()) {
                        continue;
                    }
                    return Err(retry_exhausted(&tracker));
                }
            };
            let sql = guardrails::rewrite_projection(&sql, &binary_columns);

            ensure_active(guard)?;
            log::debug!("Executing: {}", sql);
            let rows = match self.executor.execute(&sql).await {
                Ok(rows) => rows,
                Err(CapabilityError::Database { detail }) => {
                    let reason = format!("The query failed to execute: {}", detail);
                    if tracker.register_failure(reason) {
                        continue;
                    }
                    return Err(retry_exhausted(&tracker));
                }
                Err(e) if e.is_transient() => {
                    if tracker.register_failure(e.to_string()) {
                        continue;
                    }
                    return Err(retry_exhausted(&tracker));
                }
                Err(e) => return Err(TurnError::Upstream(e)),
            };

            let mut kind = OutcomeKind::Answer;
            if let Some(reason) = guardrails::check_result(question, &rows) {
                if tracker.register_failure(reason) {
                    continue;
                }
                // Budget spent on a result that executed but looks wrong.
                // A hedged answer beats a refusal here.
                log::warn!("Result anomaly on final attempt; answering best-effort");
                kind = OutcomeKind::BestEffort;
            }

            ensure_active(guard)?;
            let mut answer = match self.generator.summarize_answer(question, &rows).await {
                Ok(answer) => answer,
                Err(e) => {
                    // Summarization is a nicety; degrade to the raw rows.
                    log::warn!("Answer summarization failed, returning rows: {}", e);
                    rows.render_compact(self.row_limit as usize)
                }
            };
            if kind == OutcomeKind::BestEffort {
                answer.push_str(
                    "\n\n(I could not fully verify this result; treat it as a best effort.)",
                );
            }

            return Ok(ChatOutcome {
                answer,
                sql: Some(sql),
                tables: selected,
                attempts: tracker.current(),
                kind,
            });
        }
    }

    /// Embed the question and search the index. Transient embedding failures
    /// draw from the turn's attempt budget.
    async fn retrieve_tables(
        &self,
        catalog: &SchemaCatalog,
        question: &str,
        tracker: &mut AttemptTracker,
    ) -> Result<Vec<String>, TurnError> {
        let query = loop {
            match self.embedder.embed(question).await {
                Ok(query) => break query,
                Err(e) if e.is_transient() => {
                    if tracker.register_failure(e.to_string()) {
                        continue;
                    }
                    return Err(retry_exhausted(tracker));
                }
                Err(e) => return Err(TurnError::Upstream(e)),
            }
        };
        let matches = catalog
            .index
            .search(&query, self.retrieval_k, self.min_score)
            .map_err(TurnError::Catalog)?;
        log::debug!(
            "Retrieved {} candidate tables: {:?}",
            matches.len(),
            matches.iter().map(|m| m.table.as_str()).collect::<Vec<_>>()
        );
        Ok(matches.into_iter().map(|m| m.table).collect())
    }
}

fn ensure_active(guard: &TurnGuard) -> Result<(), TurnError> {
    if guard.cancelled() {
        Err(TurnError::Cancelled)
    } else {
        Ok(())
    }
}

fn retry_exhausted(tracker: &AttemptTracker) -> TurnError {
    TurnError::RetryExhausted {
        attempts: tracker.current(),
        last_failure: tracker.last_failure(),
    }
}
