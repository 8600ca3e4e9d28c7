//! Execution policy and status enumerations shared by sessions and executors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hint forwarded to the executor describing how it should handle a failure
/// in the middle of a batch. The engine itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Stop at the first failure and roll back
    #[default]
    Default,
    /// Keep executing the remaining actions after a failure
    ContinueOnError,
    /// Execute everything, then roll back regardless of outcome
    ExecuteAndRollback,
}

/// Overall status of one session execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecuteActionsResultStatus {
    /// Every action succeeded and post-processing (if any) accepted the result
    Success,
    /// The executor call itself failed; backend state is unknown
    ErrorOnCommunication,
    /// Validation, execution or post-processing reported a failure
    Fail,
}

impl fmt::Display for ExecuteActionsResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecuteActionsResultStatus::Success => "Success",
            ExecuteActionsResultStatus::ErrorOnCommunication => "ErrorOnCommunication",
            ExecuteActionsResultStatus::Fail => "Fail",
        };
        f.write_str(name)
    }
}
