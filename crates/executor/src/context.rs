//! State shared by a session and every sub-session derived from it:
//! action-id allocation, instance and callback bindings, collaborators and
//! `Executed` subscribers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use actionflow_core::{ActionId, ActionNode, ActionType};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bind::BindStrategyRegistry;
use crate::config::SessionConfig;
use crate::entity::InstanceRef;
use crate::executor::ExecutorSource;
use crate::outcome::ExecuteActionsResult;
use crate::properties::{PersistencePropertiesResolver, RecordFactory};
use crate::request::{ActionCallback, ActionRequest};
use crate::validator::Validator;
use crate::{Error, Result};

/// Handler notified with the complete result of every execution
pub type ExecutedHandler = Box<dyn Fn(&ExecuteActionsResult) + Send + Sync>;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique session identifier, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session id
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by `subscribe_executed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// =============================================================================
// Collaborators
// =============================================================================

/// Collaborators a session resolves executors, validators, properties and
/// bind strategies through
pub(crate) struct SessionContext {
    pub(crate) executors: Arc<dyn ExecutorSource>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) properties: Arc<dyn PersistencePropertiesResolver>,
    pub(crate) records: RecordFactory,
    pub(crate) binders: Arc<BindStrategyRegistry>,
}

struct ActionBinding {
    instance: Option<InstanceRef>,
    callback: Option<ActionCallback>,
}

// =============================================================================
// SessionCore
// =============================================================================

/// Shared state of one session tree.
///
/// Owned by the root [`PersistenceSession`](crate::PersistenceSession) and
/// borrowed by every [`AggregateSession`](crate::AggregateSession) derived
/// from it, so sub-sessions allocate from the same id space and resolve the
/// same collaborators.
pub struct SessionCore {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) context: SessionContext,
    next_action_id: u32,
    bindings: HashMap<ActionId, ActionBinding>,
    observers: Vec<(SubscriptionId, ExecutedHandler)>,
    next_subscription: u64,
}

impl SessionCore {
    pub(crate) fn new(config: SessionConfig, context: SessionContext) -> Self {
        Self {
            id: SessionId::new(),
            config,
            context,
            next_action_id: 1,
            bindings: HashMap::new(),
            observers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Session this state belongs to
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Configuration in effect
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn create_action_id(&mut self) -> ActionId {
        let id = ActionId(self.next_action_id);
        self.next_action_id += 1;
        id
    }

    /// Validate a request, allocate its id and append the node to `actions`
    pub(crate) fn register(
        &mut self,
        actions: &mut Vec<ActionNode>,
        request: ActionRequest,
    ) -> Result<ActionId> {
        if request.entity_full_name.is_empty() {
            return Err(Error::invalid_argument("entity full name is required"));
        }
        if request.action_type == ActionType::ExecuteProcedure
            && request
                .stored_procedure_name
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(Error::invalid_argument(
                "a stored procedure name is required for ExecuteProcedure",
            ));
        }

        let row_version = request
            .instance
            .as_ref()
            .and_then(|i| i.read().as_versioned().and_then(|v| v.row_version()));

        let id = self.create_action_id();
        let mut node = ActionNode::new(
            id,
            request.action_type,
            request.entity_full_name,
            request.provider_name,
        );
        node.parameters = request.parameters;
        node.conditional = request.conditional;
        node.query = request.query;
        node.stored_procedure_name = request.stored_procedure_name;
        node.row_version = row_version;
        node.command_timeout = request
            .command_timeout
            .unwrap_or(self.config.default_command_timeout);

        debug!(
            target: "actionflow::session",
            session_id = %self.id,
            action_id = %id,
            action_type = %node.action_type,
            entity = %node.entity_full_name,
            "Registered action"
        );

        actions.push(node);
        if request.instance.is_some() || request.callback.is_some() {
            self.bindings.insert(
                id,
                ActionBinding {
                    instance: request.instance,
                    callback: request.callback,
                },
            );
        }
        Ok(id)
    }

    /// Instance registered with an action
    pub(crate) fn instance(&self, id: ActionId) -> Option<InstanceRef> {
        self.bindings
            .get(&id)
            .and_then(|b| b.instance.as_ref())
            .map(Arc::clone)
    }

    /// Attach or replace the callback of a registered action
    pub(crate) fn set_callback(&mut self, id: ActionId, callback: ActionCallback) {
        self.bindings
            .entry(id)
            .or_insert(ActionBinding {
                instance: None,
                callback: None,
            })
            .callback = Some(callback);
    }

    /// Remove the callback so it can run exactly once
    pub(crate) fn take_callback(&mut self, id: ActionId) -> Option<ActionCallback> {
        self.bindings.get_mut(&id).and_then(|b| b.callback.take())
    }

    /// Drop bindings of every node in `actions`, recursively
    pub(crate) fn forget(&mut self, actions: &[ActionNode]) {
        for action in actions {
            self.bindings.remove(&action.action_id);
            self.forget(&action.before_actions);
            self.forget(&action.after_actions);
            self.forget(&action.alternative_actions);
        }
    }

    pub(crate) fn subscribe(&mut self, handler: ExecutedHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, handler));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub(crate) fn notify(&self, result: &ExecuteActionsResult) {
        for (_, handler) in &self.observers {
            handler(result);
        }
    }
}
