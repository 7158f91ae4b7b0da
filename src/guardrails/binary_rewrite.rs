//! HEX() wrapping for projected binary identifier columns.
//!
//! The database stores UUID keys as BINARY(16). A generated statement that
//! projects one raw would hand the user unprintable bytes, so the rewrite
//! walks the SELECT list and wraps any projection whose column is flagged as
//! a binary identifier. The pass is idempotent: projections already inside
//! HEX() are left untouched, and expressions it cannot confidently parse are
//! left alone (the result check catches residue downstream).

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref SELECT_LIST: Regex = Regex::new(r"(?is)^(\s*SELECT\s+(?:DISTINCT\s+)?)(.*?)(\s+FROM\s.*)$").unwrap();
    // A bare projection: optional table qualifier, column, optional alias.
    static ref PLAIN_ITEM: Regex =
        Regex::new(r"(?is)^(?:(\w+)\.)?(\w+)(?:\s+(?:AS\s+)?(\w+))?$").unwrap();
}

/// Split the SELECT list on commas that sit outside parentheses, so that
/// function calls like COUNT(DISTINCT a, b) stay intact.
fn split_projections(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in list.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].trim());
    items
}

fn rewrite_item(item: &str, binary_columns: &HashSet<String>) -> String {
    if item.to_uppercase().starts_with("HEX(") {
        return item.to_string();
    }
    let Some(captures) = PLAIN_ITEM.captures(item) else {
        return item.to_string();
    };
    let qualifier = captures.get(1).map(|m| m.as_str());
    let column = &captures[2];
    let alias = captures.get(3).map(|m| m.as_str());

    if !binary_columns.contains(column) {
        return item.to_string();
    }

    let reference = match qualifier {
        Some(q) => format!("{}.{}", q, column),
        None => column.to_string(),
    };
    format!("HEX({}) AS {}", reference, alias.unwrap_or(column))
}

/// Rewrite the SELECT list of `sql`, wrapping every projection of a column
/// in `binary_columns` as `HEX(col) AS col`. Statements without a parseable
/// SELECT list pass through unchanged.
pub fn rewrite_projection(sql: &str, binary_columns: &HashSet<String>) -> String {
    if binary_columns.is_empty() {
        return sql.to_string();
    }
    let Some(captures) = SELECT_LIST.captures(sql) else {
        return sql.to_string();
    };
    let head = &captures[1];
    let list = &captures[2];
    let tail = &captures[3];

    let rewritten: Vec<String> = split_projections(list)
        .into_iter()
        .map(|item| rewrite_item(item, binary_columns))
        .collect();

    format!("{}{}{}", head, rewritten.join(", "), tail)
}
