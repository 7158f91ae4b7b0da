//! Catalog overlay configuration.
//!
//! The overlay is a YAML file maintained alongside the deployment. It carries
//! the knowledge the database itself cannot express:
//!
//! - per-table business context lines (the vocabulary users actually use,
//!   fed into the embedding documents)
//! - manual join edges for logical relationships that are not declared as
//!   foreign-key constraints
//! - weight overrides to prefer or penalize specific relations
//!
//! ```yaml
//! contexts:
//!   lob:
//!     - "LINE OF BUSINESS (LOB) = INSURANCE TYPE"
//!     - "Common values: Medicaid, Medicare, Commercial"
//! manual_edges:
//!   - table: patient
//!     column: patient_id
//!     referenced_table: map_patient_metrics
//!     referenced_column: patient_id
//! weight_overrides:
//!   - table: patient
//!     referenced_table: user
//!     weight: 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::errors::SchemaCatalogError;
use super::metadata::{default_weight, ForeignKeyMeta, SchemaMetadata};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightOverride {
    pub table: String,
    pub referenced_table: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogOverlay {
    /// Business context lines keyed by table name.
    #[serde(default)]
    pub contexts: HashMap<String, Vec<String>>,

    /// Logical join edges not enforced as foreign keys in the database.
    #[serde(default)]
    pub manual_edges: Vec<ManualEdge>,

    /// Weight overrides applied to edges between the named table pair,
    /// in either direction.
    #[serde(default)]
    pub weight_overrides: Vec<WeightOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualEdge {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl CatalogOverlay {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SchemaCatalogError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SchemaCatalogError::OverlayReadError {
                error: format!("{}: {}", path.as_ref().display(), e),
            }
        })?;
        let overlay: CatalogOverlay = serde_yaml::from_str(&content)
            .map_err(|e| SchemaCatalogError::OverlayParseError {
                error: e.to_string(),
            })?;
        Ok(overlay)
    }

    /// Fold the overlay into a metadata snapshot: attach context lines,
    /// append manual edges, and apply weight overrides. Unknown table names
    /// in contexts or overrides are ignored (the overlay may describe tables
    /// the current database does not have); manual edges referencing unknown
    /// tables are caught later by the graph build.
    pub fn apply(&self, metadata: &mut SchemaMetadata) {
        for table in &mut metadata.tables {
            if let Some(lines) = self.contexts.get(&table.name) {
                table.context.extend(lines.iter().cloned());
            }
        }

        for edge in &self.manual_edges {
            metadata.foreign_keys.push(ForeignKeyMeta {
                table: edge.table.clone(),
                column: edge.column.clone(),
                referenced_table: edge.referenced_table.clone(),
                referenced_column: edge.referenced_column.clone(),
                weight: edge.weight,
            });
        }

        for over in &self.weight_overrides {
            for fk in &mut metadata.foreign_keys {
                let forward =
                    fk.table == over.table && fk.referenced_table == over.referenced_table;
                let reverse =
                    fk.table == over.referenced_table && fk.referenced_table == over.table;
                if forward || reverse {
                    fk.weight = over.weight;
                }
            }
        }
    }
}
