//! Registration API shared by sessions and sub-sessions
//!
//! [`PersistenceScope`] is implemented by the root
//! [`PersistenceSession`](crate::PersistenceSession) and by every
//! [`AggregateSession`]. Registrations on a scope append to that scope's own
//! action list while ids, instance bindings and collaborators come from the
//! shared [`SessionCore`].

use actionflow_core::{
    find_action, find_action_mut, ActionId, ActionNode, ActionType, Conditional, Parameter,
    QueryInfo, ResultNode,
};
use tracing::debug;

use crate::aggregate::{AggregateSession, ChildList};
use crate::context::{SessionCore, SubscriptionId};
use crate::entity::{EntityType, InstanceRef};
use crate::outcome::ExecuteActionsResult;
use crate::properties::{is_key_only_update, PropertySelection};
use crate::request::{ActionRequest, StoredProcedure};
use crate::{Error, Result};

/// Accumulation API of a session or sub-session.
pub trait PersistenceScope {
    /// Shared state and this scope's action list
    #[doc(hidden)]
    fn parts(&self) -> (&SessionCore, &[ActionNode]);

    /// Mutable shared state and this scope's action list
    #[doc(hidden)]
    fn parts_mut(&mut self) -> (&mut SessionCore, &mut Vec<ActionNode>);

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register one action and return its id.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the request has no entity name, or is an
    /// `ExecuteProcedure` without a procedure name.
    fn register_action(&mut self, request: ActionRequest) -> Result<ActionId> {
        let (core, actions) = self.parts_mut();
        core.register(actions, request)
    }

    /// Register the execution of a stored procedure
    fn register_stored_procedure(&mut self, procedure: &StoredProcedure) -> Result<ActionId> {
        self.register_action(procedure.to_request())
    }

    /// Register an insert of every persistable property of `instance`
    fn insert(&mut self, instance: InstanceRef) -> Result<ActionId> {
        let (core, actions) = self.parts_mut();
        register_instance(
            core,
            actions,
            ActionType::Insert,
            instance,
            &PropertySelection::All,
            None,
        )?
        .ok_or_else(|| Error::InvalidOperation {
            reason: "insert registration produced no action".to_string(),
        })
    }

    /// Register a key-filtered update of the selected properties.
    ///
    /// Returns `Ok(None)` without registering anything when the selection
    /// resolves to nothing beyond the key properties.
    fn update(
        &mut self,
        instance: InstanceRef,
        selection: PropertySelection,
    ) -> Result<Option<ActionId>> {
        let (core, actions) = self.parts_mut();
        register_instance(core, actions, ActionType::Update, instance, &selection, None)
    }

    /// Register an update of the selected properties filtered by `conditional`
    /// instead of by key. Same skip rule as [`update`](Self::update).
    fn update_where(
        &mut self,
        instance: InstanceRef,
        selection: PropertySelection,
        conditional: Conditional,
    ) -> Result<Option<ActionId>> {
        let (core, actions) = self.parts_mut();
        register_instance(
            core,
            actions,
            ActionType::Update,
            instance,
            &selection,
            Some(conditional),
        )
    }

    /// Register a set-based update of `T` rows selected by `query`
    fn update_query<T: EntityType>(
        &mut self,
        query: QueryInfo,
        values: Vec<Parameter>,
    ) -> Result<ActionId> {
        if values.is_empty() {
            return Err(Error::invalid_argument("a query update needs at least one value"));
        }
        let request = ActionRequest::for_entity(ActionType::Update, T::entity_descriptor())
            .parameters(values)
            .query(query);
        self.register_action(request)
    }

    /// Register a key-filtered delete of `instance`
    fn delete(&mut self, instance: InstanceRef) -> Result<ActionId> {
        let (core, actions) = self.parts_mut();
        register_instance(
            core,
            actions,
            ActionType::Delete,
            instance,
            &PropertySelection::All,
            None,
        )?
        .ok_or_else(|| Error::InvalidOperation {
            reason: "delete registration produced no action".to_string(),
        })
    }

    /// Register a delete of every `T` row matching `conditional`
    fn delete_where<T: EntityType>(&mut self, conditional: Conditional) -> Result<ActionId> {
        let request = ActionRequest::for_entity(ActionType::Delete, T::entity_descriptor())
            .conditional(conditional);
        self.register_action(request)
    }

    /// Attach a callback to a registered action, replacing any previous one.
    ///
    /// The callback runs once, after the action has been reconciled, and only
    /// on the success path.
    fn on_executed(
        &mut self,
        id: ActionId,
        callback: impl FnOnce(&ResultNode) + Send + 'static,
    ) -> Result<()> {
        let (core, actions) = self.parts_mut();
        if find_action(actions, id).is_none() {
            return Err(unknown_action(id));
        }
        core.set_callback(id, Box::new(callback));
        Ok(())
    }

    // =========================================================================
    // Sub-sessions
    // =========================================================================

    /// Scope appending to the before children of `id`
    fn before(&mut self, id: ActionId) -> Result<AggregateSession<'_>> {
        child_scope(self.parts_mut(), id, ChildList::Before)
    }

    /// Scope appending to the after children of `id`
    fn after(&mut self, id: ActionId) -> Result<AggregateSession<'_>> {
        child_scope(self.parts_mut(), id, ChildList::After)
    }

    /// Scope appending to the alternative children of `id`
    fn alternative(&mut self, id: ActionId) -> Result<AggregateSession<'_>> {
        child_scope(self.parts_mut(), id, ChildList::Alternative)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// This scope's actions
    fn actions(&self) -> &[ActionNode] {
        self.parts().1
    }

    /// Number of actions directly in this scope
    fn len(&self) -> usize {
        self.parts().1.len()
    }

    /// Whether this scope holds no actions
    fn is_empty(&self) -> bool {
        self.parts().1.is_empty()
    }

    /// Action at a position in this scope
    fn get(&self, index: usize) -> Option<&ActionNode> {
        self.parts().1.get(index)
    }

    /// Action by id anywhere below this scope
    fn get_action(&self, id: ActionId) -> Option<&ActionNode> {
        find_action(self.parts().1, id)
    }

    /// Instance registered with an action
    fn instance(&self, id: ActionId) -> Option<InstanceRef> {
        self.parts().0.instance(id)
    }

    /// Drop every action in this scope and its bindings.
    ///
    /// Ids are not reused afterwards.
    fn clear(&mut self) {
        let (core, actions) = self.parts_mut();
        core.forget(actions);
        actions.clear();
    }

    // =========================================================================
    // Executed notification
    // =========================================================================

    /// Subscribe to the complete result of every execution of the owning
    /// session
    fn subscribe_executed(
        &mut self,
        handler: impl Fn(&ExecuteActionsResult) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.parts_mut().0.subscribe(Box::new(handler))
    }

    /// Remove a subscription; false when it was not registered
    fn unsubscribe_executed(&mut self, id: SubscriptionId) -> bool {
        self.parts_mut().0.unsubscribe(id)
    }
}

fn unknown_action(id: ActionId) -> Error {
    Error::invalid_argument(format!("no action with id {} in this scope", id))
}

fn child_scope<'a>(
    (core, actions): (&'a mut SessionCore, &'a mut Vec<ActionNode>),
    id: ActionId,
    list: ChildList,
) -> Result<AggregateSession<'a>> {
    let node = find_action_mut(actions, id).ok_or_else(|| unknown_action(id))?;
    let children = match list {
        ChildList::Before => &mut node.before_actions,
        ChildList::After => &mut node.after_actions,
        ChildList::Alternative => &mut node.alternative_actions,
    };
    Ok(AggregateSession::new(core, children, id, list))
}

/// Resolve properties, build parameters and register an instance-bound action.
///
/// Returns `Ok(None)` for an update that would write nothing beyond the key.
fn register_instance(
    core: &mut SessionCore,
    actions: &mut Vec<ActionNode>,
    action_type: ActionType,
    instance: InstanceRef,
    selection: &PropertySelection,
    conditional: Option<Conditional>,
) -> Result<Option<ActionId>> {
    let (descriptor, parameters) = {
        let guard = instance.read();
        let descriptor = guard.descriptor();
        let resolved = core.context.properties.resolve(
            descriptor,
            action_type,
            conditional.is_some(),
            selection,
        )?;
        if action_type == ActionType::Update && is_key_only_update(descriptor, &resolved) {
            debug!(
                target: "actionflow::session",
                session_id = %core.id,
                entity = %descriptor.full_name,
                "Skipping update with nothing to write beyond the key"
            );
            return Ok(None);
        }
        (descriptor, core.context.records.record(&*guard, &resolved))
    };

    let mut request = ActionRequest::for_entity(action_type, descriptor)
        .parameters(parameters)
        .instance(instance);
    if let Some(conditional) = conditional {
        request = request.conditional(conditional);
    }
    core.register(actions, request).map(Some)
}
