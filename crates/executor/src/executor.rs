//! The executor contract.
//!
//! A [`PersistenceExecutor`] performs a flat array of action trees against a
//! real data store and answers with exactly one result tree per action, in
//! the same order. Sessions obtain a fresh executor from an
//! [`ExecutorSource`] for every `execute()` call and drop it before
//! returning, on every exit path.

use actionflow_core::{ActionNode, ExecutionType, ResultNode};

use crate::Result;

/// Output of one executor call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionsExecution {
    /// One result tree per input action, same order
    pub actions_result: Vec<ResultNode>,
    /// Executor-level success flag
    pub success: bool,
}

impl ActionsExecution {
    /// Wrap results, deriving `success` from the result trees
    pub fn new(actions_result: Vec<ResultNode>) -> Self {
        let success = actions_result.iter().all(ResultNode::is_success_tree);
        Self {
            actions_result,
            success,
        }
    }

    /// Wrap results with an explicit success flag
    pub fn with_success(actions_result: Vec<ResultNode>, success: bool) -> Self {
        Self {
            actions_result,
            success,
        }
    }
}

/// Pluggable backend capability.
///
/// # Contract
///
/// - `execute` returns one [`ResultNode`] per input [`ActionNode`], in order,
///   with child result arrays mirroring the action's before/after children.
///   An empty alternative-result array means the alternative path was not
///   taken.
/// - Any `Err` is treated as a communication failure: backend state is
///   unknown and nothing is reconciled.
/// - `execution_type` is a hint on how to handle a mid-batch failure.
///
/// # Thread Safety
///
/// Executors are `Send + Sync` so resolved instances can be cached and shared
/// between sessions.
pub trait PersistenceExecutor: Send + Sync {
    /// Perform the actions
    fn execute(
        &self,
        actions: &[ActionNode],
        execution_type: ExecutionType,
    ) -> Result<ActionsExecution>;

    /// Optional post-processing capability, run after reconciliation
    fn as_post_processor(&self) -> Option<&dyn ResultPostProcessor> {
        None
    }
}

/// Executor-side check over a completed batch.
///
/// An `Err` turns an otherwise successful execution into a failed one.
pub trait ResultPostProcessor {
    /// Inspect the executed actions and their results
    fn post_process(&self, actions: &[ActionNode], results: &[ResultNode]) -> Result<()>;
}

/// Creates the executor used by one session execution
pub trait ExecutorSource: Send + Sync {
    /// Create an executor scoped to a single `execute()` call
    fn create_executor(&self) -> Result<Box<dyn PersistenceExecutor>>;
}

impl<F> ExecutorSource for F
where
    F: Fn() -> Result<Box<dyn PersistenceExecutor>> + Send + Sync,
{
    fn create_executor(&self) -> Result<Box<dyn PersistenceExecutor>> {
        self()
    }
}
