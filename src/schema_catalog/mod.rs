//! Schema catalog: metadata, join graph, and relevance index.
//!
//! A `SchemaCatalog` is an immutable snapshot built from schema metadata
//! (plus an optional YAML overlay). The server holds the current snapshot
//! behind `RwLock<Arc<SchemaCatalog>>`; a reload builds a new snapshot and
//! swaps the pointer, while in-flight turns keep using the instance they
//! started with.

pub mod errors;
pub mod graph;
pub mod index;
pub mod metadata;
pub mod overlay;

pub use errors::SchemaCatalogError;
pub use graph::{JoinPathEdge, JoinPlan, SchemaGraph};
pub use index::{SchemaIndex, TableMatch};
pub use metadata::{ColumnMeta, ForeignKeyMeta, SchemaMetadata, TableMeta};
pub use overlay::CatalogOverlay;

use crate::capabilities::{CapabilityError, TextEmbedder};
use thiserror::Error;

/// Failure to produce a servable catalog. Fatal at startup; on reload the
/// previous catalog stays active.
#[derive(Debug, Error)]
pub enum CatalogBuildError {
    #[error(transparent)]
    Schema(#[from] SchemaCatalogError),

    #[error("Failed to embed schema documents: {0}")]
    Embedding(#[from] CapabilityError),
}

/// Immutable bundle of everything derived from one schema snapshot.
#[derive(Debug)]
pub struct SchemaCatalog {
    pub metadata: SchemaMetadata,
    pub graph: SchemaGraph,
    pub index: SchemaIndex,
}

impl SchemaCatalog {
    /// Apply the overlay, build the join graph, and embed the table corpus.
    pub async fn build(
        mut metadata: SchemaMetadata,
        overlay: &CatalogOverlay,
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, CatalogBuildError> {
        overlay.apply(&mut metadata);
        let graph = SchemaGraph::build(&metadata)?;
        let index = SchemaIndex::build(&metadata.tables, embedder).await?;
        log::info!(
            "Schema catalog built: {} tables, {} join edges",
            graph.table_count(),
            graph.edge_count()
        );
        Ok(Self {
            metadata,
            graph,
            index,
        })
    }
}
