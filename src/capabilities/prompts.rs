//! Prompt templates for SQL generation and answer synthesis.
//!
//! The templates encode the operational rules the healthcare database
//! demands: binary UUID columns must be HEX()-wrapped, text filters prefer
//! LIKE over equality, result sets stay bounded. The join clause comes from
//! the schema graph, so the generator is told the path rather than asked to
//! guess one.

use super::{GenerationRequest, QueryRows};

pub fn generation_prompt(request: &GenerationRequest) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(
        "You are a SQL expert writing a single MySQL SELECT statement to answer \
         the user's question about a healthcare database."
            .to_string(),
    );

    if !request.history.is_empty() {
        parts.push("CONVERSATION SO FAR:".to_string());
        for (question, answer) in &request.history {
            parts.push(format!("User: {}\nAssistant: {}", question, answer));
        }
    }

    parts.push(format!("USER QUESTION: {}", request.question));

    parts.push("RELEVANT SCHEMA:".to_string());
    parts.push(request.schema_context.clone());

    if !request.join_clause.is_empty() {
        parts.push(
            "VERIFIED JOIN PATH (use exactly these joins; do not invent others):".to_string(),
        );
        parts.push(request.join_clause.clone());
    }

    parts.push(format!(
        "RULES:\n\
         1. Binary identifier columns (BINARY(16) UUIDs) are unreadable raw; \
         ALWAYS select them as HEX(column) AS column. When filtering on one, \
         use column = UNHEX('...').\n\
         2. Prefer LIKE '%term%' over = for text descriptions; capitalization \
         and spacing vary.\n\
         3. For \"how many\" questions use COUNT(DISTINCT ...), never a column \
         that merely looks like a count.\n\
         4. Add LIMIT {} unless the question requires an aggregate-only answer.\n\
         5. Output only the SQL statement, no commentary, no code fences.",
        request.row_limit
    ));

    if !request.feedback.is_empty() {
        parts.push(format!(
            "PREVIOUS ATTEMPTS FAILED (attempt {} now). Address every item:",
            request.attempt
        ));
        for (i, item) in request.feedback.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, item));
        }
    }

    parts.join("\n\n")
}

pub fn summary_prompt(question: &str, rows: &QueryRows) -> String {
    format!(
        "User question: {}\n\nSQL result:\n{}\n\n\
         Provide a concise, natural-language answer.\n\
         - If the result is a list, summarize it.\n\
         - If the result is empty, explain that no matching records were found.\n\
         - Do not mention table names or SQL syntax.",
        question,
        rows.render_compact(20)
    )
}

/// User-facing message when retrieval finds no relevant tables.
pub fn clarification_message(question: &str) -> String {
    format!(
        "I couldn't match \"{}\" to anything in the data I have access to. \
         Could you rephrase the question, or name the kind of records you are \
         interested in (for example patients, diagnoses, insurance plans, or \
         risk scores)?",
        question
    )
}

/// User-facing message when the attempt budget is exhausted.
pub fn retry_exhausted_message() -> String {
    "I'm sorry - I tried several times but couldn't produce a reliable answer \
     to that question. Rephrasing it, or breaking it into smaller questions, \
     usually helps."
        .to_string()
}
