//! Validation rule type.
//!
//! A [`ValidationRule`] is immutable once built. Hosts construct it with
//! [`ValidationRule::new`] / [`ValidationRule::new_async`] (or one of the
//! factories in [`super::builtin`]) and refine it with the `with_*` builder
//! methods before handing it to the registry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::grid::{Row, RowRef};

/// Synchronous predicate: `Ok(true)` means the value is valid.
pub type SyncCheck = dyn Fn(&Value, &Row) -> anyhow::Result<bool> + Send + Sync;

/// Asynchronous predicate. The token is cancelled when the rule times out
/// or the validation is abandoned.
pub type AsyncCheck = dyn Fn(Value, RowRef, CancellationToken) -> BoxFuture<'static, anyhow::Result<bool>>
    + Send
    + Sync;

/// Per-row applicability condition.
pub type Condition = dyn Fn(&Row) -> bool + Send + Sync;

/// The predicate half of a rule.
#[derive(Clone)]
pub enum RuleCheck {
    Sync(Arc<SyncCheck>),
    Async(Arc<AsyncCheck>),
}

/// One validation rule bound to a field.
#[derive(Clone)]
pub struct ValidationRule {
    name: String,
    field: String,
    priority: i32,
    error_message: String,
    check: RuleCheck,
    condition: Option<Arc<Condition>>,
    timeout: Option<Duration>,
}

impl ValidationRule {
    /// Create a synchronous rule with priority 0 and a generic message.
    pub fn new<F>(field: impl Into<String>, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &Row) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::with_check(field.into(), name.into(), RuleCheck::Sync(Arc::new(check)))
    }

    /// Create an asynchronous rule. It runs under its own timeout, or the
    /// engine's default when none is set.
    pub fn new_async<F, Fut>(field: impl Into<String>, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value, RowRef, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let check: Arc<AsyncCheck> = Arc::new(move |value, row, cancel| check(value, row, cancel).boxed());
        Self::with_check(field.into(), name.into(), RuleCheck::Async(check))
    }

    fn with_check(field: String, name: String, check: RuleCheck) -> Self {
        let error_message = format!("Invalid value in {field}");
        Self {
            name,
            field,
            priority: 0,
            error_message,
            check,
            condition: None,
            timeout: None,
        }
    }

    /// Higher priorities are evaluated (and reported) first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Only evaluate the rule for rows where `condition` holds.
    pub fn with_condition<C>(mut self, condition: C) -> Self
    where
        C: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Explicit timeout, if one was configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_async(&self) -> bool {
        matches!(self.check, RuleCheck::Async(_))
    }

    pub fn check(&self) -> &RuleCheck {
        &self.check
    }

    /// Whether the rule applies to `row`. Rules without a condition always do.
    pub fn applies_to(&self, row: &Row) -> bool {
        self.condition.as_ref().map_or(true, |cond| cond(row))
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("priority", &self.priority)
            .field("error_message", &self.error_message)
            .field("is_async", &self.is_async())
            .field("conditional", &self.condition.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
