use thiserror::Error;

/// Errors raised while building or querying the schema catalog.
///
/// Build-time variants are fatal at startup: the service cannot answer
/// questions without a consistent graph and index. `NoJoinPath` is the one
/// recoverable variant - the orchestrator reacts to it by reducing the
/// required table set or asking the user to clarify.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaCatalogError {
    #[error("Schema metadata contains no tables")]
    EmptySchema,

    #[error("Duplicate table `{table}` in schema metadata")]
    DuplicateTable { table: String },

    #[error("Foreign key references unknown table `{table}`")]
    UnknownTableInForeignKey { table: String },

    #[error("Foreign key references unknown column `{table}`.`{column}`")]
    UnknownColumnInForeignKey { table: String, column: String },

    #[error("No join path connects the requested tables; unreachable: {}", unreachable.join(", "))]
    NoJoinPath { unreachable: Vec<String> },

    #[error("Embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to read catalog overlay file: {error}")]
    OverlayReadError { error: String },

    #[error("Failed to parse catalog overlay: {error}")]
    OverlayParseError { error: String },
}
