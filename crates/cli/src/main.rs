use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gridval_core::config::EngineConfig;
use gridval_core::grid::{Row, RowRef};
use gridval_core::validation::builtin::{length, one_of, pattern, range, required};
use gridval_core::validation::{ValidationRule, ValidationSummary};
use gridval_engine::ValidationEngine;
use gridval_events::ValidationEvent;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rows generated when `GRIDVAL_DEMO_ROWS` is not set.
const DEFAULT_DEMO_ROWS: usize = 250;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridval=debug,gridval_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(
        max_concurrency = config.max_concurrency,
        throttle_ms = config.throttle_interval.as_millis() as u64,
        circuit_threshold = config.circuit_threshold,
        "Loaded engine configuration"
    );

    let engine = ValidationEngine::new(config).context("invalid engine configuration")?;
    register_demo_rules(&engine)?;
    tracing::info!(rules = engine.total_rule_count(), "Validation rules registered");

    let shutdown = CancellationToken::new();
    let sweep_handle = engine.spawn_liveness_sweep(shutdown.clone());
    let logger_handle = tokio::spawn(log_events(engine.subscribe(), shutdown.clone()));

    let cancel = CancellationToken::new();
    let interrupt_cancel = cancel.clone();
    let interrupt_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling validation");
            interrupt_cancel.cancel();
        }
    });

    let row_count = std::env::var("GRIDVAL_DEMO_ROWS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DEMO_ROWS);
    let rows = demo_rows(row_count);

    let progress = |percent: f64| tracing::info!(percent, "Validation progress");
    let result = engine.validate_all(&rows, Some(&progress), &cancel).await;

    match result {
        Ok(outcomes) => {
            let summary = ValidationSummary::from_outcomes(&outcomes);
            let invalid_rows: Vec<Value> = rows
                .iter()
                .filter(|row| row.is_invalid())
                .take(10)
                .map(|row| json!({ "row": row.index(), "errors": row.error_text() }))
                .collect();
            let report = json!({
                "summary": summary,
                "stats": engine.stats(),
                "first_invalid_rows": invalid_rows,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Err(e) => tracing::warn!(error = %e, label = e.as_label(), "Validation did not complete"),
    }

    // --- Shutdown ---
    interrupt_handle.abort();
    shutdown.cancel();
    let _ = sweep_handle.await;
    let _ = logger_handle.await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn register_demo_rules(engine: &ValidationEngine) -> anyhow::Result<()> {
    engine.add_validation_rule(required("Name", "Name je povinné pole").with_priority(100))?;
    engine.add_validation_rule(length("Name", 2, 40, "Name must be 2 to 40 characters"))?;
    engine.add_validation_rule(range("Age", 18.0, 67.0, "Age must be between 18 and 67"))?;
    engine.add_validation_rule(pattern(
        "Email",
        r"^[^@\s]+@[^@\s]+\.[a-z]{2,}$",
        "Email is not a valid address",
    )?)?;
    engine.add_validation_rule(one_of(
        "Country",
        ["CZ", "SK", "DE", "AT", "PL"],
        "Unsupported country",
    ))?;
    engine.add_validation_rule(
        ValidationRule::new("Email", "company_domain", |value, _| {
            Ok(value.as_str().map_or(true, |v| !v.ends_with("@example.invalid")))
        })
        .with_message("Company e-mail required")
        .with_condition(|row| row.value_of("Country").is_some_and(|c| c == json!("DE"))),
    )?;
    engine.add_validation_rule(
        ValidationRule::new_async("Code", "registry_lookup", |value, _row, cancel| async move {
            // Simulated remote lookup.
            tokio::select! {
                _ = cancel.cancelled() => Ok(false),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {
                    Ok::<_, anyhow::Error>(value.as_str().is_some_and(|code| code.starts_with("GV-")))
                }
            }
        })
        .with_timeout(Duration::from_millis(250))
        .with_message("Unknown registry code"),
    )?;
    Ok(())
}

fn demo_rows(count: usize) -> Vec<RowRef> {
    const NAMES: [&str; 6] = ["Jana", "Petr", "A", "Lukáš", "", "Marie"];
    const COUNTRIES: [&str; 6] = ["CZ", "SK", "DE", "AT", "PL", "US"];

    let mut rng = rand::rng();
    (0..count)
        .map(|index| {
            if rng.random_bool(0.05) {
                return Arc::new(Row::from_values(
                    index,
                    [("Name", json!("")), ("Age", Value::Null), ("DeleteAction", json!(""))],
                ));
            }
            let name = NAMES[rng.random_range(0..NAMES.len())];
            let age: u32 = rng.random_range(10..80);
            let email = if rng.random_bool(0.9) {
                format!("user{index}@example.com")
            } else {
                format!("user{index}.example.com")
            };
            let code = if rng.random_bool(0.85) {
                format!("GV-{index:05}")
            } else {
                format!("XX-{index:05}")
            };
            Arc::new(Row::from_values(
                index,
                [
                    ("Name", json!(name)),
                    ("Age", json!(age.to_string())),
                    ("Email", json!(email)),
                    ("Country", json!(COUNTRIES[rng.random_range(0..COUNTRIES.len())])),
                    ("Code", json!(code)),
                    ("DeleteAction", json!("")),
                    ("ValidAlerts", json!("")),
                ],
            ))
        })
        .collect()
}

/// Log engine events until `cancel` fires or the bus closes.
async fn log_events(
    mut rx: tokio::sync::broadcast::Receiver<ValidationEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(ValidationEvent::RowValidated(row)) if !row.is_valid => {
                tracing::debug!(row = row.row_index, errors = row.error_count, "Row invalid");
            }
            Ok(ValidationEvent::RowValidated(_)) => {}
            Ok(ValidationEvent::BatchValidated(batch)) => {
                tracing::info!(
                    rows = batch.processed_rows,
                    invalid = batch.summary.invalid,
                    duration_ms = batch.duration.as_millis() as u64,
                    "Batch validation completed"
                );
            }
            Ok(ValidationEvent::Error(err)) => {
                tracing::warn!(
                    operation = %err.operation,
                    rule = ?err.rule,
                    error = %err.error,
                    "Engine reported an error"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
