//! Insert, update and delete flows reconciled against the in-memory backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionflow::{
    instance, ExecuteActionsResultStatus, ExecutionType, ExecutorRegistry, ExecutorResolver,
    Parameter, PersistenceExecutor, PersistenceScope, PersistenceSession, PropertySelection,
    SessionConfig, StoredProcedure, Value,
};
use parking_lot::Mutex;

use crate::common::*;

fn session_over(backend: &Arc<MemoryBackend>) -> PersistenceSession {
    PersistenceSession::new(source_for(backend))
}

#[test]
fn insert_assigns_identity_and_first_row_version() {
    let backend = MemoryBackend::new("sql");
    let mut session = session_over(&backend);
    let customer = instance(Customer::new("Alice"));
    let id = session.insert(customer.clone()).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fired);
    session
        .on_executed(id, move |result| {
            assert_eq!(result.action_id, id);
            assert!(result.success);
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    let stored = customer.read();
    assert_eq!(stored.id, 100);
    assert_eq!(stored.row_version, Some(1));
    assert_eq!(
        backend.column("Crm.Customer", 100, "name"),
        Some(Value::String("Alice".into()))
    );
}

#[test]
fn update_then_delete_round_trip() {
    let backend = MemoryBackend::new("sql");
    let customer = instance(Customer::new("Bob"));

    let mut session = session_over(&backend);
    session.insert(customer.clone()).unwrap();
    session.execute().unwrap();

    customer.write().tier = "gold".to_string();
    let mut session = session_over(&backend);
    let update = session
        .update(customer.clone(), PropertySelection::only(["tier"]))
        .unwrap()
        .unwrap();
    assert_eq!(session.get_action(update).unwrap().row_version, Some(1));
    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert_eq!(customer.read().row_version, Some(2));
    assert_eq!(backend.version("Crm.Customer", 100), Some(2));
    assert_eq!(
        backend.column("Crm.Customer", 100, "tier"),
        Some(Value::String("gold".into()))
    );

    let mut session = session_over(&backend);
    session.delete(customer.clone()).unwrap();
    assert!(session.execute().unwrap().is_success());
    assert_eq!(backend.row_count("Crm.Customer"), 0);
}

#[test]
fn set_based_operations_touch_every_row() {
    let backend = MemoryBackend::new("sql");
    let mut session = session_over(&backend);
    for name in ["a", "b", "c"] {
        session.insert(instance(Customer::new(name))).unwrap();
    }
    session.execute().unwrap();

    let mut session = session_over(&backend);
    let update = session
        .update_query::<Customer>(
            actionflow::QueryInfo::new("Crm.Customer"),
            vec![Parameter::input("tier", "gold")],
        )
        .unwrap();
    let delete = session
        .delete_where::<Customer>(actionflow::Conditional::equals("tier", "gold"))
        .unwrap();
    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.find(update).unwrap().result.affected_rows, 3);
    assert_eq!(outcome.find(delete).unwrap().result.affected_rows, 3);
    assert_eq!(backend.row_count("Crm.Customer"), 0);
}

#[test]
fn stored_procedure_returns_output_parameters() {
    let backend = MemoryBackend::new("sql");
    let mut session = session_over(&backend);
    session.insert(instance(Customer::new("Cy"))).unwrap();
    session.execute().unwrap();

    let returned = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&returned);
    let mut session = session_over(&backend);
    let id = session
        .register_stored_procedure(
            &StoredProcedure::new("CountCustomers", "Crm.Customer", "Sql")
                .with_parameter(Parameter::output("total")),
        )
        .unwrap();
    session
        .on_executed(id, move |result| {
            *slot.lock() = result.parameter("total").map(|p| p.value.clone());
        })
        .unwrap();

    assert!(session.execute().unwrap().is_success());
    assert_eq!(*returned.lock(), Some(Value::Int(1)));
}

#[test]
fn execution_type_reaches_the_executor() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    struct Recording(Arc<Mutex<Vec<ExecutionType>>>);
    impl PersistenceExecutor for Recording {
        fn execute(
            &self,
            actions: &[actionflow::ActionNode],
            execution_type: ExecutionType,
        ) -> actionflow::Result<actionflow::ActionsExecution> {
            self.0.lock().push(execution_type);
            Ok(actionflow::ActionsExecution::new(
                actions.iter().map(actionflow::ResultNode::success_tree).collect(),
            ))
        }
    }

    let mut registry = ExecutorRegistry::new();
    registry.register_instance("Docs", Arc::new(Recording(log)));
    let mut session = PersistenceSession::builder(ExecutorResolver::new(registry))
        .config(SessionConfig {
            execution_type: ExecutionType::ContinueOnError,
            ..SessionConfig::default()
        })
        .build();
    session.insert(instance(Note::default())).unwrap();

    assert!(session.execute().unwrap().is_success());
    assert_eq!(*seen.lock(), vec![ExecutionType::ContinueOnError]);
}

#[test]
fn continue_on_error_runs_the_rest_of_the_batch() {
    let backend = MemoryBackend::new("sql");
    let mut session = PersistenceSession::builder(source_for(&backend))
        .config(SessionConfig {
            execution_type: ExecutionType::ContinueOnError,
            ..SessionConfig::default()
        })
        .build();
    let ghost = instance(Customer {
        id: 999,
        row_version: Some(1),
        ..Customer::new("ghost")
    });
    session.delete(ghost).unwrap();
    let later = session.insert(instance(Customer::new("later"))).unwrap();

    let outcome = session.execute().unwrap();

    assert_eq!(outcome.status, ExecuteActionsResultStatus::Fail);
    assert_eq!(
        outcome.failure_message.as_deref(),
        Some("Crm.Customer 999 not found")
    );
    assert!(outcome.find(later).unwrap().result.success);
    assert_eq!(backend.row_count("Crm.Customer"), 1);
}

#[test]
fn batches_survive_both_wire_forms() {
    let backend = MemoryBackend::new("remote");
    let mut registry = ExecutorRegistry::new();
    registry.register_instance(
        "Sql",
        Arc::new(Wire {
            backend: Arc::clone(&backend),
        }),
    );
    let mut session = PersistenceSession::new(ExecutorResolver::new(registry));
    let customer = instance(Customer::new("Dee"));
    let parent = session.insert(customer.clone()).unwrap();
    session
        .after(parent)
        .unwrap()
        .register_stored_procedure(
            &StoredProcedure::new("Touch", "Crm.Customer", "Sql")
                .with_parameter(Parameter::input("payload", vec![0u8, 159, 255]))
                .with_parameter(Parameter::input("ratio", 0.25)),
        )
        .unwrap();

    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert_eq!(customer.read().id, 100);
    let received = &backend.batches()[0];
    assert_eq!(received.as_slice(), session.actions());
}
