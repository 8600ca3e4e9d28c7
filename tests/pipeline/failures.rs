//! Failure statuses, error capture, executor lifecycle and empty sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionflow::{
    instance, set_ignore_all_empty_actions, ActionsExecution, Error, ExecuteActionsResultStatus,
    ExecutorRegistry, ExecutorResolver, PersistenceScope, PersistenceSession, ResultNode,
    SessionConfig, NO_ACTIONS_MESSAGE,
};
use parking_lot::Mutex;

use crate::common::*;

fn throwing() -> SessionConfig {
    SessionConfig {
        throw_on_error: true,
        ..SessionConfig::default()
    }
}

#[test]
fn timeout_is_communication_failure_and_executor_is_dropped() {
    let lifecycle = Arc::new(Lifecycle::default());
    let source = scripted(&lifecycle, |_| {
        Err(Error::Timeout {
            seconds: 30,
            reason: "backend did not answer".into(),
        })
    });
    let mut session = PersistenceSession::new(source);
    let customer = instance(Customer::new("Gil"));
    let first = session.insert(customer.clone()).unwrap();
    let second = session.insert(instance(Customer::new("Hana"))).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    for id in [first, second] {
        let fired = Arc::clone(&fired);
        session
            .on_executed(id, move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let outcome = session.execute().unwrap();

    assert_eq!(outcome.status, ExecuteActionsResultStatus::ErrorOnCommunication);
    assert_eq!(
        outcome.failure_message.as_deref(),
        Some("timeout after 30s: backend did not answer")
    );
    assert_eq!(
        outcome.find(first).unwrap().result.message(),
        Some("timeout after 30s: backend did not answer")
    );
    assert_eq!(outcome.find(second).unwrap().result.message(), None);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(customer.read().row_version, None);
    assert_eq!(lifecycle.created(), 1);
    assert_eq!(lifecycle.dropped(), 1);
}

#[test]
fn timeout_is_returned_when_throwing() {
    let lifecycle = Arc::new(Lifecycle::default());
    let source = scripted(&lifecycle, |_| {
        Err(Error::Timeout {
            seconds: 5,
            reason: "slow".into(),
        })
    });
    let mut session = PersistenceSession::builder(source)
        .config(throwing())
        .build();
    session.insert(instance(Customer::new("Ida"))).unwrap();

    let err = session.execute().unwrap_err();

    assert!(matches!(err, Error::Timeout { seconds: 5, .. }));
    assert_eq!(lifecycle.dropped(), 1);
}

#[test]
fn short_result_array_is_contract_violation() {
    let lifecycle = Arc::new(Lifecycle::default());
    let source = scripted(&lifecycle, |actions| {
        Ok(ActionsExecution::new(vec![ResultNode::success(
            actions[0].action_id,
        )]))
    });
    let mut session = PersistenceSession::new(source);
    session.insert(instance(Customer::new("Jan"))).unwrap();
    session.insert(instance(Customer::new("Kai"))).unwrap();

    let err = session.execute().unwrap_err();

    assert!(matches!(&err, Error::ContractViolation { reason } if reason.contains("2 actions answered by 1 results")));
    assert_eq!(lifecycle.dropped(), 1);
}

#[test]
fn post_processing_rejection_fails_the_execution() {
    let backend = MemoryBackend::new("sql");
    let mut registry = ExecutorRegistry::new();
    registry.register_instance(
        "Sql",
        Arc::new(Auditing {
            backend: Arc::clone(&backend),
            reason: "audit log unavailable".into(),
        }),
    );
    let mut session = PersistenceSession::builder(ExecutorResolver::new(registry))
        .config(throwing())
        .build();
    session.insert(instance(Customer::new("Lou"))).unwrap();

    let err = session.execute().unwrap_err();

    assert_eq!(
        err,
        Error::PostProcessing {
            message: "audit log unavailable".into()
        }
    );
    assert_eq!(backend.calls(), 1);
}

#[test]
fn empty_session_fails_unless_ignored() {
    let backend = MemoryBackend::new("sql");

    let mut strict = PersistenceSession::new(source_for(&backend));
    let outcome = strict.execute().unwrap();
    assert_eq!(outcome.status, ExecuteActionsResultStatus::Fail);
    assert_eq!(outcome.failure_message.as_deref(), Some(NO_ACTIONS_MESSAGE));

    let mut throwing_session = PersistenceSession::builder(source_for(&backend))
        .config(throwing())
        .build();
    assert!(matches!(
        throwing_session.execute(),
        Err(Error::InvalidOperation { .. })
    ));

    let mut lenient = PersistenceSession::builder(source_for(&backend))
        .config(SessionConfig {
            ignore_empty_actions: true,
            ..SessionConfig::default()
        })
        .build();
    assert!(lenient.execute().unwrap().is_success());
    assert_eq!(backend.calls(), 0);
}

#[test]
fn legacy_global_switch_applies_only_to_opted_in_sessions() {
    let backend = MemoryBackend::new("sql");
    let legacy = SessionConfig {
        legacy_global_ignore_empty: true,
        ..SessionConfig::default()
    };

    set_ignore_all_empty_actions(true);
    let mut opted_in = PersistenceSession::builder(source_for(&backend))
        .config(legacy.clone())
        .build();
    let mut opted_out = PersistenceSession::new(source_for(&backend));
    let opted_in_outcome = opted_in.execute().unwrap();
    let opted_out_outcome = opted_out.execute().unwrap();
    set_ignore_all_empty_actions(false);

    assert!(opted_in_outcome.is_success());
    assert_eq!(opted_out_outcome.status, ExecuteActionsResultStatus::Fail);

    let mut after_reset = PersistenceSession::builder(source_for(&backend))
        .config(legacy)
        .build();
    assert!(!after_reset.execute().unwrap().is_success());
}

#[test]
fn observers_see_every_outcome() {
    let lifecycle = Arc::new(Lifecycle::default());
    let source = scripted(&lifecycle, |actions| {
        Ok(ActionsExecution::new(
            actions
                .iter()
                .map(|a| ResultNode::failure(a.action_id, "disk full"))
                .collect(),
        ))
    });
    let mut session = PersistenceSession::builder(source)
        .config(throwing())
        .build();
    session.insert(instance(Customer::new("Max"))).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    session.subscribe_executed(move |result| {
        log.lock().push(result.failure_message.clone());
    });

    let err = session.execute().unwrap_err();

    assert_eq!(
        err,
        Error::ExecutionFailed {
            message: "disk full".into()
        }
    );
    assert_eq!(*seen.lock(), vec![Some("disk full".to_string())]);
}
