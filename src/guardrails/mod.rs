//! Deterministic validation and repair around generated SQL.
//!
//! Three passes, applied in order on every attempt:
//!
//! 1. [`sql_rules`] normalizes the statement and rejects anything that is
//!    not a single read-only SELECT.
//! 2. [`binary_rewrite`] wraps projected binary identifier columns in
//!    `HEX()` so UUIDs render as hex text instead of raw bytes.
//! 3. [`result_check`] inspects executed rows for anomalies (unexpected
//!    emptiness, binary residue) that warrant a regeneration.
//!
//! A failed pass never aborts the turn by itself; its message becomes
//! feedback for the next generation attempt, and only the attempt budget
//! decides when to stop.

pub mod binary_rewrite;
pub mod result_check;
pub mod sql_rules;

pub use binary_rewrite::rewrite_projection;
pub use result_check::{check_result, expects_rows};
pub use sql_rules::{apply_rules, SyntaxViolation};
