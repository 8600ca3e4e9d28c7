//! Pre-dispatch validation
//!
//! Validators inspect a session's pending actions before anything reaches the
//! backend. A [`ValidatorChain`] runs its validators in order and stops at the
//! first one that reports a failure, returning that validator's result alone.

use std::fmt;
use std::sync::Arc;

use actionflow_core::{ActionId, ActionNode, ActionType};

use crate::scope::PersistenceScope;
use crate::session::PersistenceSession;

/// One rejected action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The rejected action
    pub action_id: ActionId,
    /// Why it was rejected
    pub message: String,
}

impl ValidationError {
    /// Create an error for an action
    pub fn new(action_id: ActionId, message: impl Into<String>) -> Self {
        Self {
            action_id,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of validating a session
///
/// Accumulates every error a single validator found.
/// The batch is dispatched only if `is_valid()` returns true.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    /// Errors reported, in discovery order
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a successful validation result (no errors)
    pub fn ok() -> Self {
        ValidationResult { errors: Vec::new() }
    }

    /// Create a validation result with a single error
    pub fn failure(action_id: ActionId, message: impl Into<String>) -> Self {
        ValidationResult {
            errors: vec![ValidationError::new(action_id, message)],
        }
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error
    pub fn push(&mut self, action_id: ActionId, message: impl Into<String>) {
        self.errors.push(ValidationError::new(action_id, message));
    }

    /// First error reported against an action
    pub fn error_for(&self, action_id: ActionId) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.action_id == action_id)
    }

    /// Number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// A pre-dispatch check over a whole session
pub trait Validator: Send + Sync {
    /// Inspect the session's pending actions
    fn validate(&self, session: &PersistenceSession) -> ValidationResult;
}

/// Ordered validators with first-failure short circuit
#[derive(Default, Clone)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorChain {
    /// Empty chain; always valid
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Append a shared validator
    pub fn push(&mut self, validator: Arc<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Number of validators
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the chain has no validators
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validator for ValidatorChain {
    fn validate(&self, session: &PersistenceSession) -> ValidationResult {
        for validator in &self.validators {
            let result = validator.validate(session);
            if !result.is_valid() {
                return result;
            }
        }
        ValidationResult::ok()
    }
}

// =============================================================================
// Built-in validators
// =============================================================================

fn walk(actions: &[ActionNode], visit: &mut dyn FnMut(&ActionNode)) {
    for action in actions {
        visit(action);
        walk(&action.before_actions, visit);
        walk(&action.after_actions, visit);
        walk(&action.alternative_actions, visit);
    }
}

/// Rejects inserts and updates whose instance reports business-rule
/// violations through [`Entity::validation_errors`](crate::Entity::validation_errors).
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityRulesValidator;

impl Validator for EntityRulesValidator {
    fn validate(&self, session: &PersistenceSession) -> ValidationResult {
        let mut result = ValidationResult::ok();
        walk(session.actions(), &mut |action: &ActionNode| {
            if !matches!(action.action_type, ActionType::Insert | ActionType::Update) {
                return;
            }
            if let Some(instance) = session.instance(action.action_id) {
                let errors = instance.read().validation_errors();
                if !errors.is_empty() {
                    result.push(action.action_id, errors.join("; "));
                }
            }
        });
        result
    }
}

/// Rejects instance-bound updates and deletes that carry no key parameter and
/// no conditional, since the backend could not tell which row to touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredKeyValidator;

impl Validator for RequiredKeyValidator {
    fn validate(&self, session: &PersistenceSession) -> ValidationResult {
        let mut result = ValidationResult::ok();
        walk(session.actions(), &mut |action: &ActionNode| {
            if !matches!(action.action_type, ActionType::Update | ActionType::Delete)
                || action.conditional.is_some()
                || action.query.is_some()
            {
                return;
            }
            let Some(instance) = session.instance(action.action_id) else {
                return;
            };
            let guard = instance.read();
            let keys = guard.descriptor().key_names();
            if keys.is_empty() {
                return;
            }
            if !keys.iter().any(|k| action.parameter(k).is_some()) {
                result.push(
                    action.action_id,
                    format!(
                        "{} {} carries no key parameter",
                        action.action_type, action.entity_full_name
                    ),
                );
            }
        });
        result
    }
}
