//! Row-version concurrency: tokens travel with actions and only move on a
//! fully successful execution.

use std::sync::Arc;
use std::thread;

use actionflow::{
    instance, ActionId, ExecuteActionsResultStatus, PersistenceScope, PersistenceSession,
    PropertySelection,
};

use crate::common::*;

fn persisted(backend: &Arc<MemoryBackend>, name: &str) -> Arc<parking_lot::RwLock<Customer>> {
    let customer = instance(Customer::new(name));
    let mut session = PersistenceSession::new(source_for(backend));
    session.insert(customer.clone()).unwrap();
    assert!(session.execute().unwrap().is_success());
    customer
}

#[test]
fn stale_row_version_is_rejected_and_instance_untouched() {
    let backend = MemoryBackend::new("sql");
    let original = persisted(&backend, "Eve");

    // Second copy of the same row, loaded at the same version
    let stale = instance(original.read().clone());

    let mut first = PersistenceSession::new(source_for(&backend));
    original.write().name = "Eve A".into();
    first
        .update(original.clone(), PropertySelection::only(["name"]))
        .unwrap();
    assert!(first.execute().unwrap().is_success());
    assert_eq!(original.read().row_version, Some(2));

    let mut second = PersistenceSession::new(source_for(&backend));
    stale.write().name = "Eve B".into();
    second
        .update(stale.clone(), PropertySelection::only(["name"]))
        .unwrap();
    let outcome = second.execute().unwrap();

    assert_eq!(outcome.status, ExecuteActionsResultStatus::Fail);
    assert!(outcome
        .failure_message
        .as_deref()
        .unwrap()
        .starts_with("row version conflict on Crm.Customer 100"));
    assert_eq!(stale.read().row_version, Some(1));
    assert_eq!(backend.version("Crm.Customer", 100), Some(2));
}

#[test]
fn failed_batch_moves_no_row_version() {
    let backend = MemoryBackend::new("sql");
    let a = persisted(&backend, "a");
    let b = persisted(&backend, "b");

    // Break b's token so the backend rejects it
    b.write().row_version = Some(41);
    a.write().tier = "gold".into();
    b.write().tier = "gold".into();

    let mut session = PersistenceSession::new(source_for(&backend));
    session.update(a.clone(), PropertySelection::All).unwrap();
    session.update(b.clone(), PropertySelection::All).unwrap();
    let outcome = session.execute().unwrap();

    assert!(!outcome.is_success());
    // a was applied by the backend but the batch failed, so nothing is bound
    assert_eq!(a.read().row_version, Some(1));
    assert_eq!(b.read().row_version, Some(41));
}

#[test]
fn reported_row_version_is_bound_verbatim() {
    let backend = MemoryBackend::new("sql");
    let customer = persisted(&backend, "Fin");

    for expected in 2..=4u64 {
        let mut session = PersistenceSession::new(source_for(&backend));
        customer.write().name = format!("Fin {}", expected);
        session
            .update(customer.clone(), PropertySelection::only(["name"]))
            .unwrap();
        assert!(session.execute().unwrap().is_success());
        assert_eq!(customer.read().row_version, Some(expected));
    }
}

#[test]
fn independent_sessions_run_on_separate_threads() {
    let backend = MemoryBackend::new("sql");
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                let mut session = PersistenceSession::new(source_for(&backend));
                let ids: Vec<ActionId> = (0..4)
                    .map(|j| {
                        session
                            .insert(instance(Customer::new(&format!("t{}-{}", i, j))))
                            .unwrap()
                    })
                    .collect();
                assert_eq!(ids, (1..=4).map(ActionId).collect::<Vec<_>>());
                session.execute().unwrap().is_success()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(backend.row_count("Crm.Customer"), 32);
}
