//! Test modules for the executor crate.
//!
//! Shared fixtures: a versioned `Customer` entity, a key-less `AuditEntry`
//! entity and a scripted backend that counts executor lifecycles.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionflow_core::{ActionNode, ActionType, ResultNode, Value, ValueKind};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{
    ActionsExecution, Entity, EntityDescriptor, EntityType, Error, ExecutorSource,
    PersistenceExecutor, PropertyDescriptor, Result, ResultPostProcessor, VersionedModel,
};

// =============================================================================
// Entities
// =============================================================================

pub(crate) static CUSTOMER: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Crm.Customer", "Sql")
        .with_property(PropertyDescriptor::key("id", ValueKind::Int).identity())
        .with_property(PropertyDescriptor::new("name", ValueKind::String))
        .with_property(PropertyDescriptor::new("email", ValueKind::String))
});

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub row_version: Option<u64>,
}

impl Customer {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn stored(id: i64, name: &str, row_version: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: None,
            row_version: Some(row_version),
        }
    }
}

fn type_error(property: &str, value: &Value) -> Error {
    Error::Bind {
        entity: CUSTOMER.full_name.clone(),
        reason: format!("{} cannot hold {}", property, value.type_name()),
    }
}

impl Entity for Customer {
    fn descriptor(&self) -> &'static EntityDescriptor {
        &CUSTOMER
    }

    fn get_value(&self, property: &str) -> Option<Value> {
        match property {
            "id" => Some(Value::Int(self.id)),
            "name" => Some(Value::from(self.name.as_str())),
            "email" => Some(Value::from(self.email.clone())),
            _ => None,
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "id" => self.id = value.as_int().ok_or_else(|| type_error(property, &value))?,
            "name" => {
                self.name = value
                    .as_str()
                    .ok_or_else(|| type_error(property, &value))?
                    .to_string()
            }
            "email" if value.is_null() => self.email = None,
            "email" => {
                self.email = Some(
                    value
                        .as_str()
                        .ok_or_else(|| type_error(property, &value))?
                        .to_string(),
                )
            }
            _ => {
                return Err(Error::Bind {
                    entity: CUSTOMER.full_name.clone(),
                    reason: format!("unknown property '{}'", property),
                })
            }
        }
        Ok(())
    }

    fn as_versioned(&self) -> Option<&dyn VersionedModel> {
        Some(self)
    }

    fn as_versioned_mut(&mut self) -> Option<&mut dyn VersionedModel> {
        Some(self)
    }

    fn validation_errors(&self) -> Vec<String> {
        if self.name.is_empty() {
            vec!["name is required".to_string()]
        } else {
            Vec::new()
        }
    }
}

impl EntityType for Customer {
    fn entity_descriptor() -> &'static EntityDescriptor {
        &CUSTOMER
    }
}

impl VersionedModel for Customer {
    fn row_version(&self) -> Option<u64> {
        self.row_version
    }

    fn set_row_version(&mut self, row_version: u64) {
        self.row_version = Some(row_version);
    }
}

pub(crate) static AUDIT_ENTRY: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Ops.AuditEntry", "Log")
        .with_property(PropertyDescriptor::new("message", ValueKind::String))
});

/// Append-only record without a key
#[derive(Debug, Clone, Default)]
pub(crate) struct AuditEntry {
    pub message: String,
}

impl Entity for AuditEntry {
    fn descriptor(&self) -> &'static EntityDescriptor {
        &AUDIT_ENTRY
    }

    fn get_value(&self, property: &str) -> Option<Value> {
        (property == "message").then(|| Value::from(self.message.as_str()))
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match (property, value) {
            ("message", Value::String(s)) => {
                self.message = s;
                Ok(())
            }
            (other, _) => Err(Error::Bind {
                entity: AUDIT_ENTRY.full_name.clone(),
                reason: format!("cannot set '{}'", other),
            }),
        }
    }
}

impl EntityType for AuditEntry {
    fn entity_descriptor() -> &'static EntityDescriptor {
        &AUDIT_ENTRY
    }
}

// =============================================================================
// Scripted backend
// =============================================================================

type Respond = dyn Fn(&[ActionNode]) -> Result<ActionsExecution> + Send + Sync;
type PostProcess = dyn Fn(&[ActionNode], &[ResultNode]) -> Result<()> + Send + Sync;

/// Backend whose answers are scripted per test
pub(crate) struct Backend {
    respond: Box<Respond>,
    post: Option<Box<PostProcess>>,
    created: AtomicUsize,
    calls: AtomicUsize,
    dropped: AtomicUsize,
    batches: Mutex<Vec<Vec<ActionNode>>>,
}

impl Backend {
    pub fn new(
        respond: impl Fn(&[ActionNode]) -> Result<ActionsExecution> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            post: None,
            created: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    /// Every action succeeds with row version 1
    pub fn echo() -> Arc<Self> {
        Self::new(|actions| Ok(persisted_all(actions, 1)))
    }

    pub fn with_post_processor(
        respond: impl Fn(&[ActionNode]) -> Result<ActionsExecution> + Send + Sync + 'static,
        post: impl Fn(&[ActionNode], &[ResultNode]) -> Result<()> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            post: Some(Box::new(post)),
            created: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn source(self: &Arc<Self>) -> impl ExecutorSource + 'static {
        let backend = Arc::clone(self);
        move || -> Result<Box<dyn PersistenceExecutor>> {
            backend.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedExecutor {
                backend: Arc::clone(&backend),
            }))
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn last_batch(&self) -> Vec<ActionNode> {
        self.batches.lock().last().cloned().unwrap_or_default()
    }
}

struct ScriptedExecutor {
    backend: Arc<Backend>,
}

impl PersistenceExecutor for ScriptedExecutor {
    fn execute(
        &self,
        actions: &[ActionNode],
        _execution_type: actionflow_core::ExecutionType,
    ) -> Result<ActionsExecution> {
        self.backend.calls.fetch_add(1, Ordering::SeqCst);
        self.backend.batches.lock().push(actions.to_vec());
        (self.backend.respond)(actions)
    }

    fn as_post_processor(&self) -> Option<&dyn ResultPostProcessor> {
        self.backend.post.as_ref().map(|_| self as &dyn ResultPostProcessor)
    }
}

impl ResultPostProcessor for ScriptedExecutor {
    fn post_process(&self, actions: &[ActionNode], results: &[ResultNode]) -> Result<()> {
        match &self.backend.post {
            Some(post) => post(actions, results),
            None => Ok(()),
        }
    }
}

impl Drop for ScriptedExecutor {
    fn drop(&mut self) {
        self.backend.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Successful result tree for `action`: every node reports `row_version`,
/// inserts return identity `1000 + id`, alternatives are not taken
pub(crate) fn persisted(action: &ActionNode, row_version: u64) -> ResultNode {
    let mut result = ResultNode::success(action.action_id)
        .with_row_version(row_version)
        .with_affected_rows(1);
    if action.action_type == ActionType::Insert {
        result = result.with_result(1000 + i64::from(action.action_id.get()));
    }
    result.before_actions = action
        .before_actions
        .iter()
        .map(|a| persisted(a, row_version))
        .collect();
    result.after_actions = action
        .after_actions
        .iter()
        .map(|a| persisted(a, row_version))
        .collect();
    result
}

pub(crate) fn persisted_all(actions: &[ActionNode], row_version: u64) -> ActionsExecution {
    ActionsExecution::new(actions.iter().map(|a| persisted(a, row_version)).collect())
}
