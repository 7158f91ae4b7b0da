//! Caliper - Conversational NL-to-SQL service for a relational healthcare database
//!
//! This crate provides a question-to-answer pipeline over a MySQL database through:
//! - A schema relevance index (embedding search over table documentation)
//! - A schema join-graph resolver (provably valid join paths over foreign keys)
//! - Deterministic guardrails over generated SQL and execution results
//! - A bounded-retry orchestration state machine per conversation turn

pub mod capabilities;
pub mod config;
pub mod guardrails;
pub mod orchestrator;
pub mod schema_catalog;
pub mod server;
pub mod session;
