//! Fixed, ordered table of syntax rules.
//!
//! Each rule either normalizes the statement in place or rejects it with a
//! message precise enough to steer the next generation attempt. The rules
//! run in declaration order; ordering matters (fences are stripped before
//! the statement type is inspected, the limit is appended after the
//! trailing semicolon is gone).

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// A statement the rule table refuses to execute.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyntaxViolation {
    #[error("the response contained no SQL statement")]
    Empty,

    #[error("only a single read-only SELECT statement is allowed; the statement began with '{keyword}'")]
    NotReadOnly { keyword: String },

    #[error("multiple SQL statements are not allowed; produce exactly one SELECT")]
    MultipleStatements,
}

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?is)^\s*```(?:sql)?\s*(.*?)\s*```\s*$").unwrap();
    static ref HAS_LIMIT: Regex = Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap();
    static ref FIRST_KEYWORD: Regex = Regex::new(r"(?is)^\s*(\w+)").unwrap();
}

struct Context {
    row_limit: u32,
}

struct SyntaxRule {
    name: &'static str,
    apply: fn(&mut String, &Context) -> Result<(), SyntaxViolation>,
}

const RULES: &[SyntaxRule] = &[
    SyntaxRule {
        name: "strip_code_fences",
        apply: |sql, _| {
            if let Some(captures) = CODE_FENCE.captures(sql) {
                *sql = captures[1].to_string();
            }
            *sql = sql.trim().to_string();
            Ok(())
        },
    },
    SyntaxRule {
        name: "reject_empty",
        apply: |sql, _| {
            if sql.is_empty() {
                return Err(SyntaxViolation::Empty);
            }
            Ok(())
        },
    },
    SyntaxRule {
        name: "require_select",
        apply: |sql, _| {
            let keyword = FIRST_KEYWORD
                .captures(sql)
                .map(|c| c[1].to_uppercase())
                .unwrap_or_default();
            match keyword.as_str() {
                "SELECT" | "WITH" => Ok(()),
                _ => Err(SyntaxViolation::NotReadOnly { keyword }),
            }
        },
    },
    SyntaxRule {
        name: "strip_trailing_semicolon",
        apply: |sql, _| {
            while sql.ends_with(';') {
                sql.pop();
                *sql = sql.trim_end().to_string();
            }
            Ok(())
        },
    },
    SyntaxRule {
        name: "reject_stacked_statements",
        apply: |sql, _| {
            // A semicolon surviving the trailing strip means a second
            // statement follows. Semicolons inside string literals are not
            // worth parsing for; the generator never legitimately needs one.
            if sql.contains(';') {
                return Err(SyntaxViolation::MultipleStatements);
            }
            Ok(())
        },
    },
    SyntaxRule {
        name: "ensure_row_limit",
        apply: |sql, ctx| {
            if !HAS_LIMIT.is_match(sql) {
                sql.push_str(&format!(" LIMIT {}", ctx.row_limit));
            }
            Ok(())
        },
    },
];

/// Run the rule table over a raw generated statement. Returns the
/// normalized statement, or the first violation.
pub fn apply_rules(sql: &str, row_limit: u32) -> Result<String, SyntaxViolation> {
    let ctx = Context { row_limit };
    let mut statement = sql.to_string();
    for rule in RULES {
        if let Err(violation) = (rule.apply)(&mut statement, &ctx) {
            log::debug!("Syntax rule '{}' rejected statement: {}", rule.name, violation);
            return Err(violation);
        }
    }
    Ok(statement)
}
