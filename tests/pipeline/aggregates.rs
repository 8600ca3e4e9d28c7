//! Sub-sessions: before, after and alternative children executed as one
//! batch.

use std::sync::Arc;

use actionflow::{instance, ActionId, PersistenceScope, PersistenceSession, StoredProcedure};
use parking_lot::Mutex;

use crate::common::*;

#[test]
fn children_travel_inside_their_parent() {
    let backend = MemoryBackend::new("sql");
    let mut session = PersistenceSession::new(source_for(&backend));
    let parent = session.insert(instance(Customer::new("Ray"))).unwrap();
    let note = instance(Note {
        body: "welcome".into(),
        ..Note::default()
    });
    let child = session.after(parent).unwrap().insert(note.clone()).unwrap();

    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    let batch = &backend.batches()[0];
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].after_actions[0].action_id, child);
    assert_eq!(note.read().id, 101);
    assert_eq!(outcome.find(child).unwrap().changed_properties, vec!["id"]);
}

#[test]
fn callbacks_follow_tree_order() {
    let backend = MemoryBackend::new("sql");
    let mut session = PersistenceSession::new(source_for(&backend));
    let order = Arc::new(Mutex::new(Vec::new()));

    let root = session.insert(instance(Customer::new("root"))).unwrap();
    let (before, after, nested) = {
        let before = session
            .before(root)
            .unwrap()
            .insert(instance(Customer::new("before")))
            .unwrap();
        let mut after_scope = session.after(root).unwrap();
        let after = after_scope.insert(instance(Customer::new("after"))).unwrap();
        let nested = after_scope
            .after(after)
            .unwrap()
            .insert(instance(Customer::new("nested")))
            .unwrap();
        (before, after, nested)
    };
    for id in [root, before, after, nested] {
        let order = Arc::clone(&order);
        session
            .on_executed(id, move |r| order.lock().push(r.action_id))
            .unwrap();
    }

    assert!(session.execute().unwrap().is_success());
    assert_eq!(*order.lock(), vec![before, nested, after, root]);
    assert_eq!(
        vec![root, before, after, nested],
        (1..=4).map(ActionId).collect::<Vec<_>>()
    );
}

#[test]
fn alternative_runs_when_the_primary_fails() {
    let backend = MemoryBackend::new("sql");
    let mut session = PersistenceSession::new(source_for(&backend));
    let missing = instance(Customer {
        id: 404,
        row_version: Some(1),
        ..Customer::new("missing")
    });
    let primary = session.delete(missing).unwrap();
    let fallback_note = instance(Note {
        body: "customer already gone".into(),
        ..Note::default()
    });
    let fallback = session
        .alternative(primary)
        .unwrap()
        .insert(fallback_note.clone())
        .unwrap();

    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert!(outcome.find(fallback).unwrap().result.success);
    assert_eq!(fallback_note.read().id, 100);
}

#[test]
fn alternative_skipped_when_the_primary_succeeds() {
    let backend = MemoryBackend::new("sql");
    let mut session = PersistenceSession::new(source_for(&backend));
    let primary = session.insert(instance(Customer::new("Sal"))).unwrap();
    let fallback = session
        .alternative(primary)
        .unwrap()
        .register_stored_procedure(&StoredProcedure::new("Recover", "Crm.Customer", "Sql"))
        .unwrap();

    let outcome = session.execute().unwrap();

    assert!(outcome.is_success());
    assert!(!outcome.find(fallback).unwrap().result.success);
    assert_eq!(backend.row_count("Crm.Customer"), 1);
}
