//! The persistence session.
//!
//! A [`PersistenceSession`] accumulates action trees through the
//! [`PersistenceScope`] API and executes them as one unit of work:
//!
//! 1. An empty session fails (or, when configured to ignore empty sessions,
//!    returns an empty success).
//! 2. The validator chain runs. A rejected batch never reaches the backend;
//!    its result tree is merged locally from the validator errors.
//! 3. A fresh executor is created and called once with the top-level actions.
//!    Any error from it is a communication failure.
//! 4. Results are reconciled onto instances and callbacks fire when every
//!    action succeeded; otherwise results are only paired with actions.
//! 5. The executor's post-processor, if any, runs.
//! 6. The executor is dropped, observers are notified, and the captured error
//!    is returned as `Err` only when `throw_on_error` is set.
//!
//! A results array whose shape does not match the actions is a broken
//! executor, not a failed batch, and always returns
//! [`Error::ContractViolation`].
//!
//! # Usage
//!
//! ```ignore
//! use actionflow_executor::{PersistenceScope, PersistenceSession};
//!
//! let mut session = PersistenceSession::new(resolver);
//! let id = session.insert(customer.clone())?;
//! session.on_executed(id, |result| println!("saved as {:?}", result.result))?;
//!
//! let outcome = session.execute()?;
//! assert!(outcome.is_success());
//! ```

use std::fmt;
use std::sync::Arc;

use actionflow_core::{
    first_failure_message, ActionNode, ExecuteActionsResultStatus, ResultNode,
};
use tracing::{debug, info, info_span, warn};

use crate::bind::BindStrategyRegistry;
use crate::config::SessionConfig;
use crate::context::{SessionContext, SessionCore, SessionId};
use crate::executor::{ActionsExecution, ExecutorSource, PersistenceExecutor};
use crate::outcome::ExecuteActionsResult;
use crate::properties::{DefaultPropertiesResolver, PersistencePropertiesResolver, RecordFactory};
use crate::reconcile::{merge, process_execute_fail_result, process_execute_result, verify_shape};
use crate::scope::PersistenceScope;
use crate::validator::Validator;
use crate::{Error, Result};

/// Message reported when an empty session is executed
pub const NO_ACTIONS_MESSAGE: &str = "no actions to execute";

/// Result of the pipeline before observers run: the outcome plus the error
/// to return when `throw_on_error` is set
type PipelineOutcome = (ExecuteActionsResult, Option<Error>);

// =============================================================================
// Builder
// =============================================================================

/// Configures the collaborators of a new session
pub struct SessionBuilder {
    executors: Arc<dyn ExecutorSource>,
    validator: Option<Arc<dyn Validator>>,
    properties: Arc<dyn PersistencePropertiesResolver>,
    binders: Arc<BindStrategyRegistry>,
    config: SessionConfig,
}

impl SessionBuilder {
    fn new(executors: Arc<dyn ExecutorSource>) -> Self {
        Self {
            executors,
            validator: None,
            properties: Arc::new(DefaultPropertiesResolver),
            binders: Arc::new(BindStrategyRegistry::new()),
            config: SessionConfig::default(),
        }
    }

    /// Validate every batch with `validator` (usually a
    /// [`ValidatorChain`](crate::ValidatorChain))
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Validate with a validator shared between sessions
    pub fn shared_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the persistence-properties resolver
    pub fn properties_resolver(
        mut self,
        resolver: impl PersistencePropertiesResolver + 'static,
    ) -> Self {
        self.properties = Arc::new(resolver);
        self
    }

    /// Use a bind-strategy registry shared between sessions
    pub fn bind_strategies(mut self, binders: Arc<BindStrategyRegistry>) -> Self {
        self.binders = binders;
        self
    }

    /// Execution policy
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the session
    pub fn build(self) -> PersistenceSession {
        let context = SessionContext {
            executors: self.executors,
            validator: self.validator,
            properties: self.properties,
            records: RecordFactory,
            binders: self.binders,
        };
        PersistenceSession {
            actions: Vec::new(),
            core: SessionCore::new(self.config, context),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Root unit of work: owns the top-level actions and the id counter.
///
/// Not safe for concurrent mutation; independent sessions may run on
/// different threads.
pub struct PersistenceSession {
    actions: Vec<ActionNode>,
    core: SessionCore,
}

impl PersistenceSession {
    /// Session with default collaborators and config
    pub fn new(executors: impl ExecutorSource + 'static) -> Self {
        Self::builder(executors).build()
    }

    /// Start configuring a session
    pub fn builder(executors: impl ExecutorSource + 'static) -> SessionBuilder {
        SessionBuilder::new(Arc::new(executors))
    }

    /// Start configuring a session around a shared executor source
    pub fn builder_shared(executors: Arc<dyn ExecutorSource>) -> SessionBuilder {
        SessionBuilder::new(executors)
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.core.id
    }

    /// Configuration in effect
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// Validate, dispatch, reconcile and notify. One pass, no retries.
    ///
    /// # Errors
    ///
    /// - [`Error::ContractViolation`] whenever the executor's results do not
    ///   line up with the actions
    /// - the captured failure (validation, communication, execution,
    ///   post-processing, bind, empty session) when `throw_on_error` is set;
    ///   observers are notified before it is returned
    pub fn execute(&mut self) -> Result<ExecuteActionsResult> {
        let span = info_span!(
            target: "actionflow::session",
            "execute",
            session_id = %self.core.id,
            actions = self.actions.len()
        );
        let _enter = span.enter();

        let (result, error) = self.run_pipeline()?;

        info!(
            target: "actionflow::session",
            status = %result.status,
            failure = result.failure_message.as_deref().unwrap_or(""),
            "Execution finished"
        );
        self.core.notify(&result);

        match error {
            Some(error) if self.core.config.throw_on_error => Err(error),
            _ => Ok(result),
        }
    }

    fn run_pipeline(&mut self) -> Result<PipelineOutcome> {
        if self.actions.is_empty() {
            return Ok(self.empty_outcome());
        }

        if let Some(validator) = self.core.context.validator.clone() {
            let validation = validator.validate(self);
            if !validation.is_valid() {
                warn!(
                    target: "actionflow::session",
                    errors = validation.error_count(),
                    "Validation rejected the batch"
                );
                let (results, _) = merge(&self.actions, &validation);
                let message = first_failure_message(&results)
                    .unwrap_or("validation failed")
                    .to_string();
                let executed = process_execute_fail_result(&self.actions, &results);
                return Ok((
                    ExecuteActionsResult::new(
                        ExecuteActionsResultStatus::Fail,
                        Some(message.clone()),
                        executed,
                    ),
                    Some(Error::ValidationFailed { message }),
                ));
            }
        }

        let executor = match self.core.context.executors.create_executor() {
            Ok(executor) => executor,
            Err(error) => return Ok(self.communication_failure(error)),
        };

        let execution = match executor.execute(&self.actions, self.core.config.execution_type) {
            Ok(execution) => execution,
            Err(error) => {
                drop(executor);
                return Ok(self.communication_failure(error));
            }
        };

        let outcome = self.reconcile(executor.as_ref(), execution);
        drop(executor);
        outcome
    }

    fn empty_outcome(&self) -> PipelineOutcome {
        if self.core.config.ignores_empty_actions() {
            debug!(target: "actionflow::session", "No actions; returning empty success");
            return (ExecuteActionsResult::empty(), None);
        }
        (
            ExecuteActionsResult::new(
                ExecuteActionsResultStatus::Fail,
                Some(NO_ACTIONS_MESSAGE.to_string()),
                Vec::new(),
            ),
            Some(Error::InvalidOperation {
                reason: NO_ACTIONS_MESSAGE.to_string(),
            }),
        )
    }

    /// Every top-level action fails; the first carries the formatted error
    fn communication_failure(&self, error: Error) -> PipelineOutcome {
        warn!(target: "actionflow::session", error = %error, "Executor call failed");
        let message = error.to_string();
        let results: Vec<ResultNode> = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, action)| {
                if i == 0 {
                    ResultNode::failure(action.action_id, message.clone())
                } else {
                    ResultNode::not_executed(action.action_id)
                }
            })
            .collect();
        let executed = process_execute_fail_result(&self.actions, &results);
        (
            ExecuteActionsResult::new(
                ExecuteActionsResultStatus::ErrorOnCommunication,
                Some(message),
                executed,
            ),
            Some(error),
        )
    }

    fn reconcile(
        &mut self,
        executor: &dyn PersistenceExecutor,
        execution: ActionsExecution,
    ) -> Result<PipelineOutcome> {
        let ActionsExecution {
            actions_result: results,
            success,
        } = execution;

        let all_succeeded = success && results.iter().all(ResultNode::is_success_tree);
        let mut error = None;

        let executed = if all_succeeded {
            verify_shape(&self.actions, &results)?;
            match process_execute_result(&self.actions, &results, &mut self.core) {
                Ok(executed) => executed,
                Err(e @ Error::ContractViolation { .. }) => return Err(e),
                Err(e) => {
                    warn!(target: "actionflow::session", error = %e, "Reconciliation failed");
                    error = Some(e);
                    process_execute_fail_result(&self.actions, &results)
                }
            }
        } else {
            if results.len() != self.actions.len() {
                return Err(Error::contract(format!(
                    "{} actions answered by {} results",
                    self.actions.len(),
                    results.len()
                )));
            }
            process_execute_fail_result(&self.actions, &results)
        };

        if let Some(post_processor) = executor.as_post_processor() {
            if let Err(e) = post_processor.post_process(&self.actions, &results) {
                let e = match e {
                    Error::PostProcessing { .. } => e,
                    other => Error::PostProcessing {
                        message: other.to_string(),
                    },
                };
                warn!(target: "actionflow::session", error = %e, "Post-processing rejected the results");
                error.get_or_insert(e);
            }
        }

        let status = if all_succeeded && error.is_none() {
            ExecuteActionsResultStatus::Success
        } else {
            ExecuteActionsResultStatus::Fail
        };

        let failure_message = match status {
            ExecuteActionsResultStatus::Success => None,
            _ => Some(
                first_failure_message(&results)
                    .map(str::to_string)
                    .or_else(|| error.as_ref().map(|e| e.to_string()))
                    .unwrap_or_else(|| "executor reported failure".to_string()),
            ),
        };
        if let (None, Some(message)) = (&error, &failure_message) {
            error = Some(Error::ExecutionFailed {
                message: message.clone(),
            });
        }

        Ok((
            ExecuteActionsResult::new(status, failure_message, executed),
            error,
        ))
    }
}

impl PersistenceScope for PersistenceSession {
    fn parts(&self) -> (&SessionCore, &[ActionNode]) {
        (&self.core, self.actions.as_slice())
    }

    fn parts_mut(&mut self) -> (&mut SessionCore, &mut Vec<ActionNode>) {
        (&mut self.core, &mut self.actions)
    }
}

impl fmt::Debug for PersistenceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceSession")
            .field("id", &self.core.id)
            .field("config", &self.core.config)
            .field("actions", &self.actions)
            .finish()
    }
}
