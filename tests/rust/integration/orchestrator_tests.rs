//! Orchestrator scenarios over scripted capabilities: happy path, feedback
//! loops, budget exhaustion, clarification, reduction, and cancellation.

use std::sync::Arc;

use caliper::capabilities::{CapabilityError, QueryRows};
use caliper::config::ServerConfig;
use caliper::orchestrator::{Orchestrator, OutcomeKind, TurnError};
use caliper::schema_catalog::{CatalogOverlay, SchemaCatalog};
use caliper::session::SessionRegistry;

use super::fakes::{
    count_rows, fixture_metadata, KeywordEmbedder, ScriptedExecutor, ScriptedGenerator,
};

const COUNT_SQL: &str = "SELECT COUNT(DISTINCT p.patient_id) AS total FROM patient p \
     JOIN map_patient_diagnosis m ON m.patient_id = p.patient_id LIMIT 1";

async fn catalog() -> SchemaCatalog {
    SchemaCatalog::build(
        fixture_metadata(),
        &CatalogOverlay::default(),
        &KeywordEmbedder,
    )
    .await
    .unwrap()
}

fn orchestrator(
    generator: Arc<ScriptedGenerator>,
    executor: Arc<ScriptedExecutor>,
    max_attempts: u8,
) -> Orchestrator {
    let config = ServerConfig {
        max_attempts,
        ..Default::default()
    };
    Orchestrator::new(Arc::new(KeywordEmbedder), generator, executor, &config)
}

#[tokio::test]
async fn happy_path_answers_on_first_attempt() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(COUNT_SQL.to_string())]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(42))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Answer);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.sql.as_deref().unwrap().contains("COUNT(DISTINCT"));
    assert!(outcome.tables.contains(&"patient".to_string()));
    assert!(outcome.tables.contains(&"map_patient_diagnosis".to_string()));

    let requests = generator.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].feedback.is_empty());
    assert!(
        requests[0].join_clause.contains("JOIN"),
        "generator must receive the resolved join path, got: {}",
        requests[0].join_clause
    );
}

#[tokio::test]
async fn empty_result_feeds_back_and_second_attempt_succeeds() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(COUNT_SQL.to_string()),
        Ok(COUNT_SQL.to_string()),
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Ok(QueryRows::default()),
        Ok(count_rows(5)),
    ]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Answer);
    assert_eq!(outcome.attempts, 2);

    let requests = generator.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].attempt, 2);
    assert!(
        requests[1].feedback.iter().any(|f| f.contains("no rows")),
        "second attempt must see the empty-result feedback: {:?}",
        requests[1].feedback
    );
}

#[tokio::test]
async fn database_error_becomes_regeneration_feedback() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(COUNT_SQL.to_string()),
        Ok(COUNT_SQL.to_string()),
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Err(CapabilityError::Database {
            detail: "Unknown column 'foo' in 'field list'".to_string(),
        }),
        Ok(count_rows(7)),
    ]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    let requests = generator.recorded_requests();
    assert!(requests[1]
        .feedback
        .iter()
        .any(|f| f.contains("Unknown column 'foo'")));
}

#[tokio::test]
async fn rejected_statements_exhaust_the_budget() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("DROP TABLE patient".to_string()),
        Ok("DROP TABLE patient".to_string()),
        Ok("DROP TABLE patient".to_string()),
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let err = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap_err();

    match err {
        TurnError::RetryExhausted { attempts, last_failure } => {
            assert_eq!(attempts, 3);
            assert!(last_failure.contains("DROP"));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    assert_eq!(generator.recorded_requests().len(), 3);
    assert!(
        executor.executed_statements().is_empty(),
        "a rejected statement must never reach the database"
    );
}

#[tokio::test]
async fn transient_generation_failure_consumes_an_attempt() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(CapabilityError::Transport {
            capability: "generation",
            detail: "connection reset".to_string(),
        }),
        Ok(COUNT_SQL.to_string()),
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(3))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn unrelated_question_gets_clarification_without_generation() {
    let generator = Arc::new(ScriptedGenerator::new(vec![]));
    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "hello there", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Clarification);
    assert!(outcome.sql.is_none());
    assert!(outcome.tables.is_empty());
    assert!(generator.recorded_requests().is_empty());
}

#[tokio::test]
async fn result_anomaly_on_final_attempt_degrades_to_best_effort() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(COUNT_SQL.to_string())]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(QueryRows::default())]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 1);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::BestEffort);
    assert!(outcome.answer.contains("best effort"));
    assert!(outcome.sql.is_some());
}

#[tokio::test]
async fn disconnected_candidates_are_dropped_with_a_note() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
        "SELECT first_name FROM patient LIMIT 10".to_string(),
    )]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(1))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "Did the audit log mention any patient?", &history, &guard)
        .await
        .unwrap();

    assert!(!outcome.tables.contains(&"audit_log".to_string()));
    let requests = generator.recorded_requests();
    assert!(
        requests[0].feedback.iter().any(|f| f.contains("audit_log")),
        "the dropped table must be reported to the generator: {:?}",
        requests[0].feedback
    );
}

#[tokio::test]
async fn guardrails_shape_the_executed_statement() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
        "```sql\nSELECT patient_id, first_name FROM patient;\n```".to_string(),
    )]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(1))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    orchestrator
        .run_turn(&catalog, "List patients with a diagnosis", &history, &guard)
        .await
        .unwrap();

    let executed = executor.executed_statements();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("HEX(patient_id) AS patient_id"));
    assert!(executed[0].ends_with("LIMIT 10"));
    assert!(!executed[0].contains("```"));
}

#[tokio::test]
async fn summarization_failure_degrades_to_raw_rows() {
    let generator = Arc::new(
        ScriptedGenerator::new(vec![Ok(COUNT_SQL.to_string())]).with_summary(Err(
            CapabilityError::Protocol {
                capability: "summarization",
                detail: "no candidate text".to_string(),
            },
        )),
    );
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(42))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    let outcome = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Answer);
    assert!(outcome.answer.contains("total"));
    assert!(outcome.answer.contains("42"));
}

#[tokio::test]
async fn cleared_session_cancels_the_turn() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(COUNT_SQL.to_string())]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(1))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, history) = registry.begin_turn("s1").unwrap();
    registry.clear("s1");

    let err = orchestrator
        .run_turn(&catalog, "How many patients have a diagnosis?", &history, &guard)
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Cancelled));
}

#[tokio::test]
async fn session_history_reaches_the_generator() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok(COUNT_SQL.to_string())]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Ok(count_rows(2))]));
    let orchestrator = orchestrator(Arc::clone(&generator), Arc::clone(&executor), 3);
    let catalog = catalog().await;

    let registry = SessionRegistry::new(60);
    let (guard, _) = registry.begin_turn("s1").unwrap();
    registry.record_exchange(
        "s1",
        &guard,
        "How many patients are there?".to_string(),
        "There are 120 patients.".to_string(),
    );
    drop(guard);

    let (guard, history) = registry.begin_turn("s1").unwrap();
    orchestrator
        .run_turn(&catalog, "And how many have a diagnosis?", &history, &guard)
        .await
        .unwrap();

    let requests = generator.recorded_requests();
    assert_eq!(requests[0].history.len(), 1);
    assert_eq!(requests[0].history[0].1, "There are 120 patients.");
}
