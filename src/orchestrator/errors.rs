use thiserror::Error;

use crate::capabilities::CapabilityError;
use crate::schema_catalog::SchemaCatalogError;

/// Terminal failures of one conversation turn.
///
/// Recoverable problems (a rejected statement, a database error, an
/// anomalous result, a transient upstream failure) never surface here
/// directly; they consume attempts and only become `RetryExhausted` once
/// the budget runs out.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("the session was cleared while this message was being processed")]
    Cancelled,

    #[error("no join path connects the relevant tables; unreachable: {}", unreachable.join(", "))]
    NoJoinPath { unreachable: Vec<String> },

    #[error("could not produce a reliable answer after {attempts} attempts: {last_failure}")]
    RetryExhausted { attempts: u8, last_failure: String },

    #[error("upstream capability failure: {0}")]
    Upstream(#[from] CapabilityError),

    #[error("schema catalog inconsistency: {0}")]
    Catalog(SchemaCatalogError),
}
