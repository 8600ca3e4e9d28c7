//! Core types for actionflow
//!
//! This crate defines the data model shared by sessions and executors:
//! - Value: dynamic parameter value
//! - ActionNode: one persistence operation plus its before/after/alternative children
//! - ResultNode: the backend-reported outcome of one action, same shape as the action
//! - ExecutionType / ExecuteActionsResultStatus: execution policy and overall status
//! - Codecs: XML and little-endian binary forms of action and result arrays
//! - Error: codec and data-model errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod codec;
pub mod error;
pub mod execution;
pub mod result;
pub mod value;

pub use action::{
    find_action, find_action_mut, find_parameter, ActionId, ActionNode, ActionType,
    ComparisonOperator, Conditional, LogicalOperator, Parameter, ParameterDirection, QueryInfo,
    DEFAULT_COMMAND_TIMEOUT,
};
pub use error::{Error, Result};
pub use execution::{ExecuteActionsResultStatus, ExecutionType};
pub use result::{first_failure_message, ResultNode};
pub use value::{Value, ValueKind};
