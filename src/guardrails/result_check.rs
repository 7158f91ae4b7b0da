//! Post-execution result anomaly checks.
//!
//! Execution succeeding is not the same as the question being answered. Two
//! anomalies trigger regeneration: an empty result for a question whose
//! phrasing expects matching records, and binary residue (raw identifier
//! bytes that escaped the HEX() rewrite, visible as control characters or
//! replacement characters in decoded text).

use serde_json::Value;

use crate::capabilities::QueryRows;

const ROW_EXPECTING_PHRASES: &[&str] = &[
    "how many", "count", "list", "show", "which", "who", "what", "find", "top", "average",
    "total",
];

/// Heuristic on question phrasing: does the user expect at least one row?
/// Aggregate questions always produce a row, and enumeration questions
/// normally should; an empty result for these usually means an over-strict
/// filter (exact match where LIKE was needed).
pub fn expects_rows(question: &str) -> bool {
    let lowered = question.to_lowercase();
    ROW_EXPECTING_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

fn has_binary_residue(text: &str) -> bool {
    text.chars().any(|c| {
        c == '\u{FFFD}' || (c.is_control() && c != '\n' && c != '\t' && c != '\r')
    })
}

/// Inspect executed rows. `None` means the result is acceptable; `Some`
/// carries the feedback line for the next generation attempt.
pub fn check_result(question: &str, rows: &QueryRows) -> Option<String> {
    if rows.is_empty() && expects_rows(question) {
        return Some(
            "Unexpected empty result: the query executed but returned no rows, although \
             the question expects matching records. Loosen the filters: prefer \
             LIKE '%term%' over exact equality, and check the join direction."
                .to_string(),
        );
    }

    for row in &rows.rows {
        for cell in row {
            if let Value::String(text) = cell {
                if has_binary_residue(text) {
                    return Some(
                        "The result contains raw binary identifier bytes. Select binary \
                         UUID columns as HEX(column) AS column instead of projecting \
                         them directly."
                            .to_string(),
                    );
                }
            }
        }
    }
    None
}
