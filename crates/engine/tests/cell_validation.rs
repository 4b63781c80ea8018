//! Integration tests for `validate_cell` / `validate_row`.
//!
//! These go through the public `ValidationEngine` facade and cover gating
//! (throttle, circuit, empty rows), rule ordering, timeouts, supersession
//! and the completion/error signals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use gridval_core::config::EngineConfig;
use gridval_core::error::CoreError;
use gridval_core::grid::{Row, RowRef};
use gridval_core::validation::builtin::{range, required};
use gridval_core::validation::{Bypass, CircuitState, ValidationRule, CANCELLED_MESSAGE};
use gridval_engine::{EngineError, ValidationEngine};
use gridval_events::ValidationEvent;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn unthrottled() -> ValidationEngine {
    ValidationEngine::new(EngineConfig::default().with_throttle_interval(Duration::ZERO)).unwrap()
}

fn person(index: usize, name: Value, age: Value) -> RowRef {
    Arc::new(Row::from_values(
        index,
        [
            ("Name", name),
            ("Age", age),
            ("DeleteAction", json!("delete")),
            ("ValidAlerts", json!("")),
        ],
    ))
}

// ---------------------------------------------------------------------------
// Test: rule registration through the facade
// ---------------------------------------------------------------------------

#[test]
fn rule_management_round_trip() {
    let engine = unthrottled();

    engine.add_validation_rule(required("Name", "Name je povinné pole")).unwrap();
    engine.add_validation_rule(range("Age", 18.0, 67.0, "Age out of range")).unwrap();
    engine
        .add_validation_rule(required("Name", "Name is required"))
        .unwrap();

    assert_eq!(engine.total_rule_count(), 2);
    assert!(engine.has_validation_rules("Name"));
    assert_eq!(
        engine.get_validation_rules("Name")[0].error_message(),
        "Name is required"
    );

    assert!(engine.remove_validation_rule("Age", "range").unwrap());
    assert!(!engine.remove_validation_rule("Age", "range").unwrap());
    assert_matches!(
        engine.clear_validation_rules(Some("")),
        Err(EngineError::Core(CoreError::InvalidInput(_)))
    );
    engine.clear_validation_rules(None).unwrap();
    assert_eq!(engine.total_rule_count(), 0);
}

#[test]
fn invalid_rule_is_rejected() {
    let engine = unthrottled();
    let result = engine.add_validation_rule(ValidationRule::new("", "blank", |_, _| Ok(true)));
    assert_matches!(result, Err(EngineError::Core(CoreError::InvalidInput(_))));
    assert_eq!(engine.total_rule_count(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let result = ValidationEngine::new(EngineConfig::default().with_max_concurrency(0));
    assert_matches!(result, Err(EngineError::Core(CoreError::Config(_))));
}

// ---------------------------------------------------------------------------
// Test: empty rows clear errors and produce no outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_row_clears_errors() {
    let engine = unthrottled();
    engine.add_validation_rule(required("Name", "Name je povinné pole")).unwrap();
    let cancel = CancellationToken::new();

    let row = person(0, json!(""), json!("30"));
    let outcomes = engine.validate_row(&row, &cancel).await;
    assert_eq!(outcomes.len(), 1);
    assert!(row.is_invalid());
    assert_eq!(row.error_text(), "Name: Name je povinné pole");

    row.cell("Age").unwrap().set_value(json!(""));
    let outcomes = engine.validate_row(&row, &cancel).await;
    assert!(outcomes.is_empty());
    assert!(!row.has_errors());
    assert!(!row.is_invalid());
}

// ---------------------------------------------------------------------------
// Test: a field without rules is always valid
// ---------------------------------------------------------------------------

#[tokio::test]
async fn field_without_rules_is_valid() {
    let engine = unthrottled();
    let row = person(0, json!("Ann"), json!("not a number"));
    let cell = row.cell("Age").unwrap().clone();

    let outcome = engine.validate_cell(&cell, &row, &CancellationToken::new()).await;
    assert!(outcome.is_valid);
    assert_eq!(outcome.bypass, Some(Bypass::NoRules));
    assert!(cell.errors().is_empty());
}

// ---------------------------------------------------------------------------
// Test: higher-priority messages come first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn messages_follow_priority() {
    let engine = unthrottled();
    engine
        .add_validation_rule(
            ValidationRule::new("Name", "low", |_, _| Ok(false))
                .with_priority(50)
                .with_message("low priority"),
        )
        .unwrap();
    engine
        .add_validation_rule(
            ValidationRule::new("Name", "high", |_, _| Ok(false))
                .with_priority(100)
                .with_message("high priority"),
        )
        .unwrap();

    let row = person(0, json!("Ann"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let outcome = engine.validate_cell(&cell, &row, &CancellationToken::new()).await;

    assert_eq!(outcome.messages, vec!["high priority", "low priority"]);
    assert_eq!(cell.errors(), outcome.messages);
}

// ---------------------------------------------------------------------------
// Test: built-in required / range scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn required_name_reports_message() {
    let engine = unthrottled();
    engine.add_validation_rule(required("Name", "Name je povinné pole")).unwrap();

    let row = person(0, json!(""), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let outcome = engine.validate_cell(&cell, &row, &CancellationToken::new()).await;

    assert!(!outcome.is_valid);
    assert_eq!(outcome.messages, vec!["Name je povinné pole"]);
}

#[tokio::test]
async fn age_range_scenarios() {
    let engine = unthrottled();
    engine.add_validation_rule(range("Age", 18.0, 67.0, "Age out of range")).unwrap();
    let cancel = CancellationToken::new();

    for (index, (age, expected)) in [("70", false), ("40", true), ("", true)].into_iter().enumerate() {
        let row = person(index, json!("Ann"), json!(age));
        let cell = row.cell("Age").unwrap().clone();
        let outcome = engine.validate_cell(&cell, &row, &cancel).await;
        assert_eq!(outcome.is_valid, expected, "age {age:?}");
    }
}

// ---------------------------------------------------------------------------
// Test: the circuit opens after repeated exceptions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn circuit_opens_after_five_exceptions() {
    let engine = unthrottled();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    engine
        .add_validation_rule(ValidationRule::new("Name", "flaky", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("backend down"))
        }))
        .unwrap();

    let row = person(0, json!("Ann"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let cancel = CancellationToken::new();

    for _ in 0..5 {
        let outcome = engine.validate_cell(&cell, &row, &cancel).await;
        assert!(!outcome.is_valid);
    }
    assert_eq!(engine.circuit_state(), CircuitState::Open);

    let outcome = engine.validate_cell(&cell, &row, &cancel).await;
    assert!(outcome.is_valid);
    assert_eq!(outcome.bypass, Some(Bypass::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(engine.circuit_state(), CircuitState::HalfOpen);

    let outcome = engine.validate_cell(&cell, &row, &cancel).await;
    assert_eq!(outcome.bypass, None);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(engine.circuit_state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn clean_validation_closes_half_open_circuit() {
    let engine = unthrottled();
    engine
        .add_validation_rule(ValidationRule::new("Name", "picky", |value, _| {
            if value == &json!("boom") {
                anyhow::bail!("cannot check {value}");
            }
            Ok(true)
        }))
        .unwrap();

    let row = person(0, json!("boom"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let cancel = CancellationToken::new();
    for _ in 0..5 {
        engine.validate_cell(&cell, &row, &cancel).await;
    }
    tokio::time::advance(Duration::from_secs(6)).await;

    cell.set_value(json!("Ann"));
    let outcome = engine.validate_cell(&cell, &row, &cancel).await;
    assert!(outcome.is_valid);
    assert_eq!(engine.circuit_state(), CircuitState::Closed);
}

// ---------------------------------------------------------------------------
// Test: requests inside the debounce window are skipped
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn second_request_within_window_is_throttled() {
    let engine = ValidationEngine::new(EngineConfig::default()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    engine
        .add_validation_rule(ValidationRule::new("Name", "counted", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }))
        .unwrap();

    let row = person(0, json!("Ann"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let cancel = CancellationToken::new();

    let first = engine.validate_cell(&cell, &row, &cancel).await;
    assert!(!first.is_valid);

    tokio::time::advance(Duration::from_millis(10)).await;
    let second = engine.validate_cell(&cell, &row, &cancel).await;
    assert!(second.is_valid);
    assert_eq!(second.bypass, Some(Bypass::Throttled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(40)).await;
    let third = engine.validate_cell(&cell, &row, &cancel).await;
    assert_eq!(third.bypass, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.stats().throttled, 1);
}

#[tokio::test(start_paused = true)]
async fn invalidated_row_is_not_throttled() {
    let engine = ValidationEngine::new(EngineConfig::default()).unwrap();
    engine.add_validation_rule(required("Name", "required")).unwrap();

    let row = person(0, json!("Ann"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let cancel = CancellationToken::new();

    engine.validate_cell(&cell, &row, &cancel).await;
    assert_eq!(engine.stats().throttle_entries, 1);

    engine.invalidate_row(0);
    let stats = engine.stats();
    assert_eq!(stats.throttle_entries, 0);
    assert_eq!(stats.tracked_cells, 0);

    let outcome = engine.validate_cell(&cell, &row, &cancel).await;
    assert_eq!(outcome.bypass, None);
}

#[tokio::test(start_paused = true)]
async fn reindexed_cell_is_not_throttled_by_previous_occupant() {
    let engine = ValidationEngine::new(EngineConfig::default()).unwrap();
    engine.add_validation_rule(required("Name", "required")).unwrap();
    let cancel = CancellationToken::new();

    let removed = person(0, json!("Ann"), json!(30));
    let cell = removed.cell("Name").unwrap().clone();
    engine.validate_cell(&cell, &removed, &cancel).await;
    drop(cell);
    drop(removed);

    let moved = person(1, json!(""), json!(30));
    moved.set_index(0);
    let cell = moved.cell("Name").unwrap().clone();
    let outcome = engine.validate_cell(&cell, &moved, &cancel).await;

    assert_eq!(outcome.bypass, None);
    assert!(!outcome.is_valid);
    assert_eq!(cell.errors(), vec!["required".to_string()]);
    assert_eq!(engine.stats().throttled, 0);
}

// ---------------------------------------------------------------------------
// Test: async rules time out into a failure, not an error
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn hanging_async_rule_times_out() {
    let engine = unthrottled();
    engine
        .add_validation_rule(
            ValidationRule::new_async("Name", "remote", |_, _, _| {
                futures::future::pending::<anyhow::Result<bool>>()
            })
            .with_timeout(Duration::from_millis(1)),
        )
        .unwrap();

    let row = person(0, json!("Ann"), json!(30));
    let cell = row.cell("Name").unwrap().clone();
    let outcome = engine.validate_cell(&cell, &row, &CancellationToken::new()).await;

    assert!(!outcome.is_valid);
    assert!(!outcome.cancelled);
    assert!(outcome.was_async);
    assert!(outcome.messages[0].starts_with(CANCELLED_MESSAGE));
    assert_eq!(engine.stats().rule_timeouts, 1);
    assert_eq!(engine.circuit_state(), CircuitState::Closed);
}

// ---------------------------------------------------------------------------
// Test: a newer validation of the same cell supersedes the older one
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn latest_edit_wins() {
    let engine = unthrottled();
    engine
        .add_validation_rule(
            ValidationRule::new_async("Name", "slow_lookup", |value, _, _| async move {
                if value == json!("old") {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    return Ok::<_, anyhow::Error>(false);
                }
                Ok(true)
            })
            .with_message("unknown name"),
        )
        .unwrap();

    let row = person(0, json!("old"), json!(30));
    let cell = row.cell("Name").unwrap().clone();

    let first = tokio::spawn({
        let engine = engine.clone();
        let row = Arc::clone(&row);
        let cell = Arc::clone(&cell);
        async move { engine.validate_cell(&cell, &row, &CancellationToken::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    cell.set_value(json!("new"));
    let second = engine.validate_cell(&cell, &row, &CancellationToken::new()).await;
    assert!(second.is_valid);

    let first = first.await.unwrap();
    assert!(first.cancelled);
    assert!(cell.errors().is_empty());
    assert_eq!(engine.stats().superseded, 1);
    assert_eq!(engine.stats().in_flight, 0);
}

// ---------------------------------------------------------------------------
// Test: row completion and error signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn row_validation_publishes_events() {
    let engine = unthrottled();
    engine.add_validation_rule(required("Name", "required")).unwrap();
    engine
        .add_validation_rule(ValidationRule::new("Age", "broken", |_, _| {
            Err(anyhow::anyhow!("age service down"))
        }))
        .unwrap();
    let mut rx = engine.subscribe();

    let row = person(7, json!(""), json!(30));
    let outcomes = engine.validate_row(&row, &CancellationToken::new()).await;
    assert_eq!(outcomes.len(), 2);

    let error = rx.recv().await.unwrap();
    assert_matches!(error, ValidationEvent::Error(err) => {
        assert_eq!(err.operation, "validate_cell");
        assert_eq!(err.row_index, Some(7));
        assert_eq!(err.field.as_deref(), Some("Age"));
        assert_eq!(err.rule.as_deref(), Some("broken"));
    });

    let completed = rx.recv().await.unwrap();
    assert_matches!(completed, ValidationEvent::RowValidated(event) => {
        assert_eq!(event.row_index, 7);
        assert!(!event.is_valid);
        assert_eq!(event.error_count, 2);
        assert_eq!(event.processed_rows, 1);
        assert_eq!(event.outcomes.len(), 2);
    });
}

#[tokio::test(start_paused = true)]
async fn throttled_revalidation_reports_row_state() {
    let engine = ValidationEngine::new(EngineConfig::default()).unwrap();
    engine.add_validation_rule(required("Name", "Name je povinné pole")).unwrap();
    let mut rx = engine.subscribe();
    let cancel = CancellationToken::new();

    let row = person(0, json!(""), json!(30));
    engine.validate_row(&row, &cancel).await;
    assert_matches!(rx.recv().await.unwrap(), ValidationEvent::RowValidated(event) => {
        assert!(!event.is_valid);
    });

    tokio::time::advance(Duration::from_millis(10)).await;
    let outcomes = engine.validate_row(&row, &cancel).await;
    assert_eq!(outcomes[0].bypass, Some(Bypass::Throttled));
    assert!(row.is_invalid());
    assert_matches!(rx.recv().await.unwrap(), ValidationEvent::RowValidated(event) => {
        assert_eq!(event.is_valid, !row.is_invalid());
        assert_eq!(event.error_count, 0);
    });
}
