//! Thread-safe rule registry keyed by field.

use std::sync::Arc;

use dashmap::DashMap;

use super::rules::ValidationRule;
use crate::error::CoreError;

/// Holds every registered rule, grouped by field.
///
/// Each field's list is kept sorted by priority (highest first, insertion
/// order among equal priorities), so readers never sort. Rules are stored
/// behind `Arc`; a validation that already fetched a list keeps evaluating
/// the rules it saw even if the registry changes underneath it.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: DashMap<String, Vec<Arc<ValidationRule>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rule`, replacing any rule with the same name on its field.
    pub fn add(&self, rule: ValidationRule) -> Result<Arc<ValidationRule>, CoreError> {
        require_field(rule.field())?;
        if rule.name().trim().is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "Rule name must not be empty (field {})",
                rule.field()
            )));
        }

        let rule = Arc::new(rule);
        let mut list = self.rules.entry(rule.field().to_string()).or_default();
        list.retain(|existing| existing.name() != rule.name());
        let pos = list
            .iter()
            .position(|existing| existing.priority() < rule.priority())
            .unwrap_or(list.len());
        list.insert(pos, Arc::clone(&rule));

        tracing::debug!(
            field = rule.field(),
            rule = rule.name(),
            priority = rule.priority(),
            "Validation rule registered"
        );
        Ok(rule)
    }

    /// Remove the rule `name` from `field`. Returns whether anything was removed.
    pub fn remove(&self, field: &str, name: &str) -> Result<bool, CoreError> {
        require_field(field)?;
        let removed = match self.rules.get_mut(field) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|r| r.name() != name);
                before != list.len()
            }
            None => false,
        };
        self.rules.remove_if(field, |_, list| list.is_empty());
        Ok(removed)
    }

    /// Drop the rules of one field, or of every field when `field` is `None`.
    pub fn clear(&self, field: Option<&str>) -> Result<(), CoreError> {
        match field {
            Some(field) => {
                require_field(field)?;
                self.rules.remove(field);
            }
            None => self.rules.clear(),
        }
        Ok(())
    }

    /// Rules for `field`, highest priority first.
    ///
    /// Lookups never fail: a blank field simply has no rules, since `add`
    /// refuses to register one.
    pub fn get(&self, field: &str) -> Vec<Arc<ValidationRule>> {
        self.rules
            .get(field)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        self.rules.get(field).is_some_and(|list| !list.is_empty())
    }

    /// Total number of rules across all fields.
    pub fn count(&self) -> usize {
        self.rules.iter().map(|entry| entry.value().len()).sum()
    }

    /// Fields that currently have at least one rule, sorted.
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .rules
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        fields.sort_unstable();
        fields
    }
}

fn require_field(field: &str) -> Result<(), CoreError> {
    if field.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            "Rule field must not be empty".to_string(),
        ));
    }
    Ok(())
}
