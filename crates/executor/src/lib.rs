//! # Actionflow Executor
//!
//! Persistence sessions: accumulate a tree of actions against domain
//! entities, validate it, hand it to a provider-specific executor in one call
//! and reconcile the returned results back onto the entities.
//!
//! This crate provides:
//! - [`PersistenceSession`] - the unit of work, with its [`PersistenceScope`]
//!   registration API and [`AggregateSession`] sub-sessions
//! - [`PersistenceExecutor`] - the contract a backend implements
//! - [`ExecutorResolver`] - provider-name routing with a creation cache
//! - [`ValidatorChain`] - pre-execution validation, stopping at the first
//!   failing validator
//!
//! ## Quick Start
//!
//! ```text
//! use actionflow_executor::{
//!     instance, ExecutorRegistry, ExecutorResolver, PersistenceScope, PersistenceSession,
//! };
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register("Sql", || Ok(Arc::new(SqlExecutor::connect(url)?) as _));
//! let resolver = ExecutorResolver::new(registry);
//!
//! let mut session = PersistenceSession::new(resolver);
//! let customer = instance(Customer::new("Alice"));
//! session.insert(customer.clone())?;
//!
//! let outcome = session.execute()?;
//! assert!(outcome.is_success());
//! assert_eq!(customer.read().row_version, Some(1));
//! ```
//!
//! ## Execution statuses
//!
//! | Status | Meaning |
//! |--------|---------|
//! | **Success** | every action and post-processing succeeded |
//! | **Fail** | validation, an action or post-processing failed |
//! | **ErrorOnCommunication** | the executor call itself failed |

#![warn(missing_docs)]

mod aggregate;
mod bind;
mod config;
mod context;
mod entity;
mod error;
mod executor;
mod outcome;
mod properties;
mod reconcile;
mod request;
mod resolver;
mod scope;
mod session;
mod validator;

// Test modules
#[cfg(test)]
mod tests;

// =============================================================================
// Public API - Everything users need is re-exported here
// =============================================================================

pub use aggregate::{AggregateSession, ChildList};
pub use bind::{BindMode, BindStrategy, BindStrategyRegistry, ReflectiveBinder};
pub use config::{
    ignore_all_empty_actions, set_ignore_all_empty_actions, ResolverConfig, SessionConfig,
};
#[doc(hidden)]
pub use context::SessionCore;
pub use context::{ExecutedHandler, SessionId, SubscriptionId};
pub use entity::{
    instance, Entity, EntityDescriptor, EntityType, InstanceRef, PropertyDescriptor,
    VersionedModel,
};
pub use error::Error;
pub use executor::{ActionsExecution, ExecutorSource, PersistenceExecutor, ResultPostProcessor};
pub use outcome::{ExecuteAction, ExecuteActionsResult};
pub use properties::{
    is_key_only_update, DefaultPropertiesResolver, PersistencePropertiesResolver,
    PropertySelection, RecordFactory, ResolvedProperty,
};
pub use reconcile::{merge, process_execute_fail_result};
pub use request::{ActionCallback, ActionRequest, StoredProcedure};
pub use resolver::{
    executor_service_name, DynamicPersistenceExecutor, ExecutorFactory, ExecutorRegistry,
    ExecutorResolver,
};
pub use scope::PersistenceScope;
pub use session::{PersistenceSession, SessionBuilder, NO_ACTIONS_MESSAGE};
pub use validator::{
    EntityRulesValidator, RequiredKeyValidator, ValidationError, ValidationResult, Validator,
    ValidatorChain,
};

// Re-export the action model so users don't need actionflow-core directly
pub use actionflow_core::{
    ActionId, ActionNode, ActionType, ComparisonOperator, Conditional, ExecuteActionsResultStatus,
    ExecutionType, LogicalOperator, Parameter, ParameterDirection, QueryInfo, ResultNode, Value,
    ValueKind,
};

/// Result type for session operations
pub type Result<T> = std::result::Result<T, Error>;
