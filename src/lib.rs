//! Actionflow - persistence sessions over pluggable executors
//!
//! A session accumulates insert, update, delete and stored-procedure actions
//! against domain entities, organized as trees (before, after and alternative
//! children). On `execute()` it validates the batch, hands it to the executor
//! resolved for the batch's provider in a single call, and reconciles the
//! returned identities, row versions and values back onto the entities.
//!
//! # Quick Start
//!
//! ```ignore
//! use actionflow::{instance, ExecutorRegistry, ExecutorResolver, PersistenceScope, PersistenceSession};
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register("Sql", || Ok(Arc::new(SqlExecutor::connect(url)?) as _));
//!
//! let mut session = PersistenceSession::new(ExecutorResolver::new(registry));
//! let order = instance(Order::new(42));
//! let order_id = session.insert(order.clone())?;
//! session.after(order_id)?.insert(instance(OrderLine::new("widget", 3)))?;
//!
//! let outcome = session.execute()?;
//! ```
//!
//! # Architecture
//!
//! - [`actionflow_core`] holds the action and result trees and their XML and
//!   binary codecs, re-exported here as [`codec`]
//! - [`actionflow_executor`] holds sessions, executor resolution, validation
//!   and reconciliation; everything public is re-exported at the crate root

// Re-export the public API from actionflow-executor
pub use actionflow_executor::*;

// Wire codecs for action and result trees
pub use actionflow_core::codec;
pub use actionflow_core::{find_action, find_parameter, first_failure_message, DEFAULT_COMMAND_TIMEOUT};
