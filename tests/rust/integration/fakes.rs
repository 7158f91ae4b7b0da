//! Scripted capability fakes and the shared schema fixture.
//!
//! The embedder is keyword-based and fully deterministic: each domain
//! keyword owns one axis, and a text's vector counts keyword occurrences.
//! Questions mentioning patients and diagnoses therefore retrieve exactly
//! the patient/diagnosis tables, and unrelated chatter embeds to zero.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use caliper::capabilities::{
    CapabilityError, GenerationRequest, QueryRows, SchemaProvider, SqlExecutor, SqlGenerator,
    TextEmbedder,
};
use caliper::schema_catalog::{ColumnMeta, ForeignKeyMeta, SchemaMetadata, TableMeta};

const KEYWORDS: &[&str] = &["patient", "diagnos", "lob", "audit"];

pub struct KeywordEmbedder;

#[async_trait]
impl TextEmbedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let lowered = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|keyword| lowered.matches(keyword).count() as f32)
            .collect())
    }
}

/// Generator that replays a script of responses and records every request
/// it saw, so tests can assert on feedback and attempt numbers.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, CapabilityError>>>,
    summary: Result<String, CapabilityError>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, CapabilityError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            summary: Ok("Here is what I found.".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summary(mut self, summary: Result<String, CapabilityError>) -> Self {
        self.summary = summary;
        self
    }

    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate_sql(&self, request: &GenerationRequest) -> Result<String, CapabilityError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(CapabilityError::Protocol {
                    capability: "generation",
                    detail: "generator script exhausted".to_string(),
                })
            })
    }

    async fn summarize_answer(
        &self,
        _question: &str,
        _rows: &QueryRows,
    ) -> Result<String, CapabilityError> {
        self.summary.clone()
    }
}

/// Executor that replays scripted results and records executed statements.
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<QueryRows, CapabilityError>>>,
    pub executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<QueryRows, CapabilityError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryRows, CapabilityError> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(CapabilityError::Database {
                    detail: "executor script exhausted".to_string(),
                })
            })
    }

    async fn ping(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

pub struct FixtureProvider {
    pub metadata: SchemaMetadata,
}

#[async_trait]
impl SchemaProvider for FixtureProvider {
    async fn fetch(&self) -> Result<SchemaMetadata, CapabilityError> {
        Ok(self.metadata.clone())
    }
}

fn column(name: &str, sql_type: &str, binary_id: bool) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        nullable: !binary_id,
        binary_id,
    }
}

/// Healthcare-shaped fixture: patient and diagnosis joined through a mapping
/// table, an insurance table hanging off patient, and an isolated audit
/// table with no declared relationships.
pub fn fixture_metadata() -> SchemaMetadata {
    SchemaMetadata {
        tables: vec![
            TableMeta {
                name: "patient".to_string(),
                columns: vec![
                    column("patient_id", "binary(16)", true),
                    column("first_name", "varchar(100)", false),
                    column("lob_id", "int", false),
                ],
                context: vec!["MAIN PATIENT TABLE - PRIMARY ENTITY".to_string()],
            },
            TableMeta {
                name: "diagnosis".to_string(),
                columns: vec![
                    column("diagnosis_id", "binary(16)", true),
                    column("description", "varchar(255)", false),
                ],
                context: vec![],
            },
            TableMeta {
                name: "map_patient_diagnosis".to_string(),
                columns: vec![
                    column("patient_id", "binary(16)", true),
                    column("diagnosis_id", "binary(16)", true),
                ],
                context: vec![],
            },
            TableMeta {
                name: "lob".to_string(),
                columns: vec![
                    column("lob_id", "int", false),
                    column("name", "varchar(100)", false),
                ],
                context: vec!["LINE OF BUSINESS (LOB) = INSURANCE TYPE".to_string()],
            },
            TableMeta {
                name: "audit_log".to_string(),
                columns: vec![column("audit_id", "int", false)],
                context: vec![],
            },
        ],
        foreign_keys: vec![
            ForeignKeyMeta {
                table: "map_patient_diagnosis".to_string(),
                column: "patient_id".to_string(),
                referenced_table: "patient".to_string(),
                referenced_column: "patient_id".to_string(),
                weight: 1,
            },
            ForeignKeyMeta {
                table: "map_patient_diagnosis".to_string(),
                column: "diagnosis_id".to_string(),
                referenced_table: "diagnosis".to_string(),
                referenced_column: "diagnosis_id".to_string(),
                weight: 1,
            },
            ForeignKeyMeta {
                table: "patient".to_string(),
                column: "lob_id".to_string(),
                referenced_table: "lob".to_string(),
                referenced_column: "lob_id".to_string(),
                weight: 1,
            },
        ],
    }
}

pub fn count_rows(n: i64) -> QueryRows {
    QueryRows {
        columns: vec!["total".to_string()],
        rows: vec![vec![serde_json::json!(n)]],
    }
}
