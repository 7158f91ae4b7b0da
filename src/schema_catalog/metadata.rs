//! Schema metadata model.
//!
//! The metadata provider (MySQL `information_schema`, or a fixture in tests)
//! delivers this structure once at startup and again on explicit reload.
//! Everything downstream - graph, index, guardrails, prompts - is derived
//! from it and never mutates it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A column as declared in the database schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared SQL type, e.g. `varchar(255)`, `binary(16)`, `decimal(10,2)`
    pub sql_type: String,
    pub nullable: bool,
    /// Fixed-length binary identifier flag. These columns hold raw UUID
    /// bytes and must be wrapped in `HEX()` before reaching a user.
    pub binary_id: bool,
}

/// A table together with its columns and optional business context lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    /// Free-text business documentation injected from the catalog overlay.
    /// This is what makes "insurance" find the `lob` table.
    #[serde(default)]
    pub context: Vec<String>,
}

impl TableMeta {
    /// Compose the document that gets embedded for this table: business
    /// context first (it carries the vocabulary users actually use), then
    /// the technical column listing.
    pub fn embedding_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.context.len() + self.columns.len() + 2);
        parts.push(format!("TABLE: {}", self.name));
        parts.extend(self.context.iter().cloned());
        parts.push("COLUMNS:".to_string());
        for column in &self.columns {
            let mut line = format!("  {} {}", column.name, column.sql_type);
            if column.binary_id {
                line.push_str(" (binary identifier, select via HEX())");
            }
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            parts.push(line);
        }
        parts.join("\n")
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A declared foreign-key relationship between two columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// Path-finding weight; defaults to 1. Overlays may penalize joins that
    /// are technically valid but analytically weak (audit/user bookkeeping).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

pub(crate) fn default_weight() -> u32 {
    1
}

/// Complete schema metadata snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableMeta>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl SchemaMetadata {
    pub fn table(&self, name: &str) -> Option<&TableMeta> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Names of all columns flagged as binary identifiers across the given
    /// tables. The guardrail rewrite matches projections by column name, so
    /// the set is name-based rather than (table, column)-qualified.
    pub fn binary_id_columns(&self, tables: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for table in tables {
            if let Some(meta) = self.table(table) {
                for column in &meta.columns {
                    if column.binary_id {
                        out.insert(column.name.clone());
                    }
                }
            }
        }
        out
    }

    /// Render the schema context block handed to the SQL generator for the
    /// selected candidate tables.
    pub fn render_tables(&self, tables: &[String]) -> String {
        let mut blocks = Vec::with_capacity(tables.len());
        for name in tables {
            if let Some(meta) = self.table(name) {
                blocks.push(meta.embedding_text());
            }
        }
        blocks.join("\n\n")
    }
}
