//! Tree algorithms pairing action trees with result trees
//!
//! - [`merge`]: builds a result tree locally from validator errors, when the
//!   batch never reaches the backend
//! - [`process_execute_result`]: walks a successful batch, binding returned
//!   values onto instances and firing callbacks once every bind succeeded
//! - [`process_execute_fail_result`]: pairs actions and results without any
//!   reconciliation, padding missing results with `not_executed`
//!
//! All three recurse one frame per tree level. Action graphs are authored by
//! hand and stay shallow.

use std::sync::Arc;

use actionflow_core::{ActionNode, ActionType, ResultNode, Value};
use tracing::warn;

use crate::bind::BindMode;
use crate::context::SessionCore;
use crate::entity::{Entity, InstanceRef};
use crate::outcome::ExecuteAction;
use crate::validator::ValidationResult;
use crate::{Error, Result};

// =============================================================================
// Merge
// =============================================================================

/// Materialize a result tree for a batch rejected by validation.
///
/// An action succeeds only if it has no validator error and both its before
/// and after subtrees succeeded. Failing actions carry the validator message
/// verbatim; ancestors failing through a child carry no message of their
/// own. Alternatives are never evaluated and become success placeholders.
///
/// Returns the results and whether the whole level succeeded.
pub fn merge(actions: &[ActionNode], validation: &ValidationResult) -> (Vec<ResultNode>, bool) {
    let mut all_succeeded = true;
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let (before_actions, before_ok) = merge(&action.before_actions, validation);
        let (after_actions, after_ok) = merge(&action.after_actions, validation);
        let own_error = validation.error_for(action.action_id);
        let success = own_error.is_none() && before_ok && after_ok;

        let mut result = match own_error {
            Some(error) => ResultNode::failure(action.action_id, error.to_string()),
            None if success => ResultNode::success(action.action_id),
            None => ResultNode::not_executed(action.action_id),
        };
        result.before_actions = before_actions;
        result.after_actions = after_actions;
        result.alternative_actions = action
            .alternative_actions
            .iter()
            .map(ResultNode::success_tree)
            .collect();

        all_succeeded &= success;
        results.push(result);
    }

    (results, all_succeeded)
}

// =============================================================================
// Shape checks
// =============================================================================

fn verify_len(actions: &[ActionNode], results: &[ResultNode]) -> Result<()> {
    if actions.len() != results.len() {
        return Err(Error::contract(format!(
            "{} actions answered by {} results",
            actions.len(),
            results.len()
        )));
    }
    Ok(())
}

/// Check that every before/after level (and every taken alternative level)
/// has exactly one result per action.
pub(crate) fn verify_shape(actions: &[ActionNode], results: &[ResultNode]) -> Result<()> {
    verify_len(actions, results)?;
    for (action, result) in actions.iter().zip(results) {
        verify_shape(&action.before_actions, &result.before_actions).map_err(|e| {
            Error::contract(format!("before actions of {}: {}", action.action_id, reason(&e)))
        })?;
        verify_shape(&action.after_actions, &result.after_actions).map_err(|e| {
            Error::contract(format!("after actions of {}: {}", action.action_id, reason(&e)))
        })?;
        if !action.alternative_actions.is_empty() && !result.alternative_actions.is_empty() {
            verify_shape(&action.alternative_actions, &result.alternative_actions).map_err(
                |e| {
                    Error::contract(format!(
                        "alternative actions of {}: {}",
                        action.action_id,
                        reason(&e)
                    ))
                },
            )?;
        }
    }
    Ok(())
}

fn reason(error: &Error) -> String {
    match error {
        Error::ContractViolation { reason } => reason.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Success path
// =============================================================================

/// Reconcile a successful batch.
///
/// Runs in two passes. The bind pass writes returned values onto every
/// instance in tree order; if any bind fails, every instance touched so far
/// is restored and the error is returned with no row version moved and no
/// callback fired. The commit pass then walks the same nodes and, per action,
/// handles before children, the action's own row version, after children,
/// alternatives when the backend took that path, and finally the action's
/// callback, exactly once.
pub(crate) fn process_execute_result(
    actions: &[ActionNode],
    results: &[ResultNode],
    core: &mut SessionCore,
) -> Result<Vec<ExecuteAction>> {
    let mut journal = BindJournal::default();
    let executed = match bind_tree(actions, results, core, &mut journal) {
        Ok(executed) => executed,
        Err(error) => {
            journal.rollback();
            return Err(error);
        }
    };
    commit_tree(actions, results, core);
    Ok(executed)
}

/// Whether the action's own result is bound onto its instance
fn binds(action: &ActionNode, result: &ResultNode) -> bool {
    result.row_version > 0 || action.action_type == ActionType::Insert
}

/// Whether the backend ran the alternatives and they all succeeded
fn alternatives_taken(action: &ActionNode, result: &ResultNode) -> bool {
    !action.alternative_actions.is_empty()
        && !result.alternative_actions.is_empty()
        && result
            .alternative_actions
            .iter()
            .all(ResultNode::is_success_tree)
}

fn bind_tree(
    actions: &[ActionNode],
    results: &[ResultNode],
    core: &SessionCore,
    journal: &mut BindJournal,
) -> Result<Vec<ExecuteAction>> {
    verify_len(actions, results)?;
    let mut executed = Vec::with_capacity(actions.len());

    for (action, result) in actions.iter().zip(results) {
        let before_actions =
            bind_tree(&action.before_actions, &result.before_actions, core, journal)?;

        let changed_properties = if binds(action, result) {
            bind(core, action, result, journal)?
        } else {
            Vec::new()
        };

        let after_actions = bind_tree(&action.after_actions, &result.after_actions, core, journal)?;

        let alternative_actions = if alternatives_taken(action, result) {
            bind_tree(
                &action.alternative_actions,
                &result.alternative_actions,
                core,
                journal,
            )?
        } else {
            process_execute_fail_result(&action.alternative_actions, &result.alternative_actions)
        };

        executed.push(ExecuteAction {
            action: action.clone(),
            result: result.clone(),
            changed_properties,
            before_actions,
            after_actions,
            alternative_actions,
        });
    }

    Ok(executed)
}

/// Second pass: row versions and callbacks, only once every bind succeeded
fn commit_tree(actions: &[ActionNode], results: &[ResultNode], core: &mut SessionCore) {
    for (action, result) in actions.iter().zip(results) {
        commit_tree(&action.before_actions, &result.before_actions, core);

        if binds(action, result) {
            if let Some(instance) = core.instance(action.action_id) {
                let mut guard = instance.write();
                if let Some(versioned) = guard.as_versioned_mut() {
                    versioned.set_row_version(result.row_version);
                }
            }
        }

        commit_tree(&action.after_actions, &result.after_actions, core);
        if alternatives_taken(action, result) {
            commit_tree(&action.alternative_actions, &result.alternative_actions, core);
        }

        if let Some(callback) = core.take_callback(action.action_id) {
            callback(result);
        }
    }
}

fn bind(
    core: &SessionCore,
    action: &ActionNode,
    result: &ResultNode,
    journal: &mut BindJournal,
) -> Result<Vec<String>> {
    let Some(instance) = core.instance(action.action_id) else {
        return Ok(Vec::new());
    };
    let strategy = core.context.binders.get(&action.entity_full_name);
    let mode = if action.action_type == ActionType::Insert {
        BindMode::Insert
    } else {
        BindMode::Update
    };

    let mut guard = instance.write();
    journal.record(&instance, &*guard);
    strategy.bind(result, mode, &mut *guard)
}

/// Property values captured before each bind, replayed in reverse when a
/// later bind fails
#[derive(Default)]
struct BindJournal {
    entries: Vec<(InstanceRef, Vec<(String, Value)>)>,
}

impl BindJournal {
    fn record(&mut self, instance: &InstanceRef, entity: &dyn Entity) {
        let values = entity
            .descriptor()
            .properties
            .iter()
            .filter_map(|p| entity.get_value(&p.name).map(|v| (p.name.clone(), v)))
            .collect();
        self.entries.push((Arc::clone(instance), values));
    }

    fn rollback(self) {
        for (instance, values) in self.entries.into_iter().rev() {
            let mut guard = instance.write();
            for (name, value) in values {
                if let Err(error) = guard.set_value(&name, value) {
                    warn!(
                        target: "actionflow::bind",
                        entity = %guard.descriptor().full_name,
                        property = %name,
                        error = %error,
                        "Could not restore property after a failed bind"
                    );
                }
            }
        }
    }
}

// =============================================================================
// Failure path
// =============================================================================

/// Pair actions with results, keeping the action tree's shape.
///
/// Nothing is bound and no callback fires. Missing results (including empty
/// child arrays) are padded with `not_executed`.
pub fn process_execute_fail_result(
    actions: &[ActionNode],
    results: &[ResultNode],
) -> Vec<ExecuteAction> {
    actions
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let result = results
                .get(i)
                .cloned()
                .unwrap_or_else(|| ResultNode::not_executed(action.action_id));
            let before_actions =
                process_execute_fail_result(&action.before_actions, &result.before_actions);
            let after_actions =
                process_execute_fail_result(&action.after_actions, &result.after_actions);
            let alternative_actions = process_execute_fail_result(
                &action.alternative_actions,
                &result.alternative_actions,
            );
            ExecuteAction {
                action: action.clone(),
                result,
                changed_properties: Vec::new(),
                before_actions,
                after_actions,
                alternative_actions,
            }
        })
        .collect()
}
