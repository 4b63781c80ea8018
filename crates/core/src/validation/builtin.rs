//! Built-in rule factories for the common column checks.
//!
//! Except for [`required`], every factory treats a blank value as valid:
//! presence is the job of `required`, the rest only judge data that exists.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use super::rules::ValidationRule;
use crate::error::CoreError;
use crate::grid::{is_blank, value_text};

/// The value must not be blank.
pub fn required(field: impl Into<String>, message: impl Into<String>) -> ValidationRule {
    ValidationRule::new(field, "required", |value, _| Ok(!is_blank(value))).with_message(message)
}

/// The value must parse as a number within `min..=max`.
///
/// Numbers and numeric strings are accepted; anything else fails.
pub fn range(
    field: impl Into<String>,
    min: f64,
    max: f64,
    message: impl Into<String>,
) -> ValidationRule {
    ValidationRule::new(field, "range", move |value, _| {
        if is_blank(value) {
            return Ok(true);
        }
        Ok(as_number(value).is_some_and(|n| n >= min && n <= max))
    })
    .with_message(message)
}

/// The value's text must be between `min` and `max` characters long.
pub fn length(
    field: impl Into<String>,
    min: usize,
    max: usize,
    message: impl Into<String>,
) -> ValidationRule {
    ValidationRule::new(field, "length", move |value, _| {
        if is_blank(value) {
            return Ok(true);
        }
        let len = value_text(value).chars().count();
        Ok(len >= min && len <= max)
    })
    .with_message(message)
}

/// The value's text must match `pattern`.
///
/// The pattern is compiled once here; an invalid pattern is rejected
/// instead of silently passing at evaluation time.
pub fn pattern(
    field: impl Into<String>,
    pattern: &str,
    message: impl Into<String>,
) -> Result<ValidationRule, CoreError> {
    let re = Regex::new(pattern)
        .map_err(|e| CoreError::InvalidInput(format!("Invalid pattern {pattern:?}: {e}")))?;

    Ok(ValidationRule::new(field, "pattern", move |value, _| {
        if is_blank(value) {
            return Ok(true);
        }
        Ok(re.is_match(&value_text(value)))
    })
    .with_message(message))
}

/// The value's text must be one of `allowed`.
pub fn one_of<I, S>(field: impl Into<String>, allowed: I, message: impl Into<String>) -> ValidationRule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let allowed: HashSet<String> = allowed.into_iter().map(Into::into).collect();
    ValidationRule::new(field, "one_of", move |value, _| {
        if is_blank(value) {
            return Ok(true);
        }
        Ok(allowed.contains(&*value_text(value)))
    })
    .with_message(message)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}
