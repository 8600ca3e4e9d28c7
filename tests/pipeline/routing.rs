//! Provider routing through the executor resolver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionflow::{
    instance, ActionRequest, ActionType, ExecuteActionsResultStatus, ExecutorRegistry,
    ExecutorResolver, Parameter, PersistenceExecutor, PersistenceScope, PersistenceSession,
    ResolverConfig, Result,
};

use crate::common::*;

fn two_providers() -> (Arc<MemoryBackend>, Arc<MemoryBackend>, ExecutorResolver) {
    let sql = MemoryBackend::new("sql");
    let docs = MemoryBackend::new("docs");
    let mut registry = ExecutorRegistry::new();
    registry
        .register_instance("Sql", Arc::clone(&sql) as Arc<dyn PersistenceExecutor>)
        .register_instance("Docs", Arc::clone(&docs) as Arc<dyn PersistenceExecutor>);
    (sql, docs, ExecutorResolver::new(registry))
}

#[test]
fn batch_routes_to_its_provider() {
    let (sql, docs, resolver) = two_providers();

    let mut session = PersistenceSession::new(resolver.clone());
    session.insert(instance(Note::default())).unwrap();
    assert!(session.execute().unwrap().is_success());

    assert_eq!(docs.calls(), 1);
    assert_eq!(sql.calls(), 0);
}

#[test]
fn mixed_provider_batch_goes_to_first_provider() {
    let (sql, docs, resolver) = two_providers();

    let mut session = PersistenceSession::new(resolver);
    session.insert(instance(Customer::new("Ned"))).unwrap();
    session.insert(instance(Note::default())).unwrap();
    assert!(session.execute().unwrap().is_success());

    assert_eq!(sql.calls(), 1);
    assert_eq!(docs.calls(), 0);
    assert_eq!(sql.batches()[0].len(), 2);
    assert_eq!(sql.row_count("Docs.Note"), 1);
}

#[test]
fn executors_are_created_once_per_provider() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let backend = MemoryBackend::new("sql");
    let shared = Arc::clone(&backend);
    let mut registry = ExecutorRegistry::new();
    registry.register("Sql", move || -> Result<Arc<dyn PersistenceExecutor>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&shared) as Arc<dyn PersistenceExecutor>)
    });
    let resolver = ExecutorResolver::new(registry);

    for name in ["a", "b", "c"] {
        let mut session = PersistenceSession::new(resolver.clone());
        session.insert(instance(Customer::new(name))).unwrap();
        assert!(session.execute().unwrap().is_success());
    }

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.cached_len(), 1);
    assert_eq!(backend.calls(), 3);
}

#[test]
fn unregistered_provider_fails_on_communication() {
    let (_, _, resolver) = two_providers();
    let mut session = PersistenceSession::new(resolver);
    session
        .register_action(
            ActionRequest::new(ActionType::Insert, "Hr.Badge", "Ldap")
                .parameter(Parameter::input("holder", "Olga")),
        )
        .unwrap();

    let outcome = session.execute().unwrap();

    assert_eq!(outcome.status, ExecuteActionsResultStatus::ErrorOnCommunication);
    assert!(outcome
        .failure_message
        .as_deref()
        .unwrap()
        .contains("LdapPersistenceExecutor"));
}

#[test]
fn unnamed_provider_uses_configured_default() {
    let backend = MemoryBackend::new("sql");
    let mut registry = ExecutorRegistry::new();
    registry.register_instance("Sql", Arc::clone(&backend) as Arc<dyn PersistenceExecutor>);
    let resolver =
        ExecutorResolver::with_config(registry, ResolverConfig::with_default_provider("Sql"));

    let mut session = PersistenceSession::new(resolver);
    session
        .register_action(
            ActionRequest::new(ActionType::Insert, "Ops.Event", "")
                .parameter(Parameter::input("kind", "login")),
        )
        .unwrap();

    assert!(session.execute().unwrap().is_success());
    assert_eq!(backend.row_count("Ops.Event"), 1);
}
