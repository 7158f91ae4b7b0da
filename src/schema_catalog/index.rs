//! Schema relevance index.
//!
//! In-memory nearest-neighbor search over per-table embedding vectors. The
//! corpus is small (a schema has tens of tables, not millions of documents),
//! so an exhaustive cosine scan is both exact and fast enough; what matters
//! here is the contract: a hard score cutoff and fully deterministic
//! ordering, so repeated searches against an unchanged index always return
//! the identical ranked list.

use super::errors::SchemaCatalogError;
use super::metadata::TableMeta;
use crate::capabilities::{CapabilityError, TextEmbedder};

/// One search hit: a table name and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMatch {
    pub table: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    table: String,
    embedding: Vec<f32>,
}

/// Immutable embedding index over the schema's tables. Rebuilt wholesale on
/// schema reload, never mutated in place.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl SchemaIndex {
    /// Embed every table document and build the index. The embedding calls
    /// go through the external capability; a failure there aborts the build
    /// (a partially indexed schema would silently hide tables).
    pub async fn build(
        tables: &[TableMeta],
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, CapabilityError> {
        let mut entries = Vec::with_capacity(tables.len());
        let mut dimension = 0;
        for table in tables {
            let embedding = embedder.embed(&table.embedding_text()).await?;
            if dimension == 0 {
                dimension = embedding.len();
            }
            entries.push(IndexEntry {
                table: table.name.clone(),
                embedding,
            });
        }
        // Deterministic storage order; search ordering does not depend on
        // provider response order.
        entries.sort_by(|a, b| a.table.cmp(&b.table));
        Ok(Self { entries, dimension })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` tables with similarity >= `min_score`, ordered by
    /// descending similarity with lexicographic table-name tie-break. An
    /// empty result is a valid answer, not an error.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<TableMatch>, SchemaCatalogError> {
        if self.dimension != 0 && query.len() != self.dimension {
            return Err(SchemaCatalogError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut matches: Vec<TableMatch> = self
            .entries
            .iter()
            .map(|entry| TableMatch {
                table: entry.table.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .filter(|m| m.score >= min_score)
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.table.cmp(&b.table))
        });
        matches.truncate(k);
        Ok(matches)
    }
}

/// Cosine similarity; zero vectors score 0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
