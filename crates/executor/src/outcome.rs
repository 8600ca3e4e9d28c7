//! Session-level execution result

use actionflow_core::{ActionId, ActionNode, ExecuteActionsResultStatus, ResultNode};

/// One action paired with its result and reconciled children
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteAction {
    /// The executed action
    pub action: ActionNode,
    /// Its result
    pub result: ResultNode,
    /// Instance properties rewritten from the result during reconciliation
    pub changed_properties: Vec<String>,
    /// Before children
    pub before_actions: Vec<ExecuteAction>,
    /// After children
    pub after_actions: Vec<ExecuteAction>,
    /// Alternative children; results are `not_executed` when the path was not
    /// taken
    pub alternative_actions: Vec<ExecuteAction>,
}

impl ExecuteAction {
    /// Id of the executed action
    pub fn action_id(&self) -> ActionId {
        self.action.action_id
    }

    /// Find an entry by action id in this subtree
    pub fn find(&self, id: ActionId) -> Option<&ExecuteAction> {
        if self.action_id() == id {
            return Some(self);
        }
        find_in(&self.before_actions, id)
            .or_else(|| find_in(&self.after_actions, id))
            .or_else(|| find_in(&self.alternative_actions, id))
    }
}

fn find_in(entries: &[ExecuteAction], id: ActionId) -> Option<&ExecuteAction> {
    entries.iter().find_map(|e| e.find(id))
}

/// Outcome of one `execute()` call
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteActionsResult {
    /// Overall status
    pub status: ExecuteActionsResultStatus,
    /// First failure message found, or the formatted error
    pub failure_message: Option<String>,
    /// Executed action tree
    pub actions: Vec<ExecuteAction>,
}

impl ExecuteActionsResult {
    pub(crate) fn new(
        status: ExecuteActionsResultStatus,
        failure_message: Option<String>,
        actions: Vec<ExecuteAction>,
    ) -> Self {
        Self {
            status,
            failure_message,
            actions,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(ExecuteActionsResultStatus::Success, None, Vec::new())
    }

    /// Whether the status is `Success`
    pub fn is_success(&self) -> bool {
        self.status == ExecuteActionsResultStatus::Success
    }

    /// Find an entry by action id anywhere in the tree
    pub fn find(&self, id: ActionId) -> Option<&ExecuteAction> {
        find_in(&self.actions, id)
    }

    /// Top-level results, in registration order
    pub fn results(&self) -> impl Iterator<Item = &ResultNode> {
        self.actions.iter().map(|a| &a.result)
    }
}
