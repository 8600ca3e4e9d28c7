//! Registration requests
//!
//! [`ActionRequest`] is the low-level description of one action to register:
//! routing keys, parameters, optional instance and completion callback.
//! The typed insert/update/delete operations build one internally.

use actionflow_core::{ActionType, Conditional, Parameter, QueryInfo, ResultNode};

use crate::entity::{EntityDescriptor, InstanceRef};

/// Completion callback, invoked once with the action's reconciled result
pub type ActionCallback = Box<dyn FnOnce(&ResultNode) + Send>;

/// Description of one action to register
pub struct ActionRequest {
    pub(crate) action_type: ActionType,
    pub(crate) entity_full_name: String,
    pub(crate) provider_name: String,
    pub(crate) instance: Option<InstanceRef>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) callback: Option<ActionCallback>,
    pub(crate) conditional: Option<Conditional>,
    pub(crate) query: Option<QueryInfo>,
    pub(crate) stored_procedure_name: Option<String>,
    pub(crate) command_timeout: Option<u32>,
}

impl ActionRequest {
    /// Request with routing keys only
    pub fn new(
        action_type: ActionType,
        entity_full_name: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            entity_full_name: entity_full_name.into(),
            provider_name: provider_name.into(),
            instance: None,
            parameters: Vec::new(),
            callback: None,
            conditional: None,
            query: None,
            stored_procedure_name: None,
            command_timeout: None,
        }
    }

    /// Request routed by an entity descriptor
    pub fn for_entity(action_type: ActionType, descriptor: &EntityDescriptor) -> Self {
        Self::new(
            action_type,
            descriptor.full_name.as_str(),
            descriptor.provider_name.as_str(),
        )
    }

    /// Attach the originating instance
    pub fn instance(mut self, instance: InstanceRef) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Replace the parameter list
    pub fn parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Append one parameter
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Filter the action with a conditional
    pub fn conditional(mut self, conditional: Conditional) -> Self {
        self.conditional = Some(conditional);
        self
    }

    /// Target a set of rows through a query
    pub fn query(mut self, query: QueryInfo) -> Self {
        self.query = Some(query);
        self
    }

    /// Procedure to run, for `ExecuteProcedure`
    pub fn stored_procedure(mut self, name: impl Into<String>) -> Self {
        self.stored_procedure_name = Some(name.into());
        self
    }

    /// Command timeout hint in seconds
    pub fn command_timeout(mut self, seconds: u32) -> Self {
        self.command_timeout = Some(seconds);
        self
    }

    /// Callback invoked once with the reconciled result
    pub fn on_executed(mut self, callback: impl FnOnce(&ResultNode) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

/// Stored-procedure descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProcedure {
    /// Procedure name
    pub name: String,
    /// Storage provider that hosts the procedure
    pub provider_name: String,
    /// Entity the procedure is associated with, used for routing
    pub entity_full_name: String,
    /// Ordered parameters
    pub parameters: Vec<Parameter>,
    /// Command timeout hint in seconds
    pub command_timeout: u32,
}

impl StoredProcedure {
    /// Procedure with no parameters and the default timeout
    pub fn new(
        name: impl Into<String>,
        entity_full_name: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_name: provider_name.into(),
            entity_full_name: entity_full_name.into(),
            parameters: Vec::new(),
            command_timeout: actionflow_core::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Append a parameter
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Override the command timeout
    pub fn with_command_timeout(mut self, seconds: u32) -> Self {
        self.command_timeout = seconds;
        self
    }

    pub(crate) fn to_request(&self) -> ActionRequest {
        ActionRequest::new(
            ActionType::ExecuteProcedure,
            self.entity_full_name.as_str(),
            self.provider_name.as_str(),
        )
        .stored_procedure(self.name.as_str())
        .parameters(self.parameters.clone())
        .command_timeout(self.command_timeout)
    }
}
