//! Result tree data model
//!
//! A [`ResultNode`] is the backend-reported outcome of one [`ActionNode`].
//! It mirrors the action's shape: one result per before/after/alternative
//! child, in the same order.
//!
//! [`ActionNode`]: crate::action::ActionNode

use serde::{Deserialize, Serialize};

use crate::action::{find_parameter, ActionId, ActionNode, Parameter};
use crate::value::Value;

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultNode {
    /// Id of the action this result answers
    pub action_id: ActionId,
    /// Whether the action succeeded
    pub success: bool,
    /// Failure description, when the action failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// Rows touched by the action
    #[serde(default)]
    pub affected_rows: u64,
    /// New optimistic-concurrency token, 0 when none was reported
    #[serde(default)]
    pub row_version: u64,
    /// Echoed input and produced output parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Scalar output, e.g. a generated identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Results of the before actions
    #[serde(default)]
    pub before_actions: Vec<ResultNode>,
    /// Results of the after actions
    #[serde(default)]
    pub after_actions: Vec<ResultNode>,
    /// Results of the alternative actions; empty when the alternative path
    /// was not taken
    #[serde(default)]
    pub alternative_actions: Vec<ResultNode>,
}

impl ResultNode {
    /// A successful result with no payload
    pub fn success(action_id: ActionId) -> Self {
        Self {
            action_id,
            success: true,
            ..Default::default()
        }
    }

    /// A failed result carrying a message
    pub fn failure(action_id: ActionId, message: impl Into<String>) -> Self {
        Self {
            action_id,
            success: false,
            failure_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A failed result without a message, for actions that never ran
    pub fn not_executed(action_id: ActionId) -> Self {
        Self {
            action_id,
            success: false,
            ..Default::default()
        }
    }

    /// Successful results mirroring the full shape of `action`
    pub fn success_tree(action: &ActionNode) -> Self {
        Self {
            before_actions: action.before_actions.iter().map(Self::success_tree).collect(),
            after_actions: action.after_actions.iter().map(Self::success_tree).collect(),
            alternative_actions: action
                .alternative_actions
                .iter()
                .map(Self::success_tree)
                .collect(),
            ..Self::success(action.action_id)
        }
    }

    /// Set the reported row version
    pub fn with_row_version(mut self, row_version: u64) -> Self {
        self.row_version = row_version;
        self
    }

    /// Set the affected row count
    pub fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    /// Set the scalar result
    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Append an output parameter
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        find_parameter(&self.parameters, name)
    }

    /// Non-empty failure message, if any
    pub fn message(&self) -> Option<&str> {
        self.failure_message.as_deref().filter(|m| !m.is_empty())
    }

    /// Whether this node and every before/after descendant succeeded.
    ///
    /// Alternatives are not part of the normal path and are not inspected.
    pub fn is_success_tree(&self) -> bool {
        self.success
            && self.before_actions.iter().all(ResultNode::is_success_tree)
            && self.after_actions.iter().all(ResultNode::is_success_tree)
    }
}

/// First non-empty failure message, scanning depth-first Before → self → After.
pub fn first_failure_message(results: &[ResultNode]) -> Option<&str> {
    for result in results {
        if let Some(message) = first_failure_message(&result.before_actions) {
            return Some(message);
        }
        if !result.success {
            if let Some(message) = result.message() {
                return Some(message);
            }
        }
        if let Some(message) = first_failure_message(&result.after_actions) {
            return Some(message);
        }
    }
    None
}
