//! Validator chains in front of the backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actionflow::{
    instance, ActionRequest, ActionType, EntityRulesValidator, ExecuteActionsResultStatus,
    PersistenceScope, PersistenceSession, RequiredKeyValidator, ValidationResult, Validator,
    ValidatorChain,
};

use crate::common::*;

struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Validator for Counting {
    fn validate(&self, _session: &PersistenceSession) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ValidationResult::ok()
    }
}

fn chain(after_rules: &Arc<AtomicUsize>) -> ValidatorChain {
    ValidatorChain::new()
        .with(RequiredKeyValidator)
        .with(EntityRulesValidator)
        .with(Counting {
            calls: Arc::clone(after_rules),
        })
}

#[test]
fn rejected_batch_never_reaches_backend() {
    let backend = MemoryBackend::new("sql");
    let after_rules = Arc::new(AtomicUsize::new(0));
    let mut session = PersistenceSession::builder(source_for(&backend))
        .validator(chain(&after_rules))
        .build();
    let good = session.insert(instance(Customer::new("Pia"))).unwrap();
    let bad = session
        .insert(instance(Customer {
            tier: "platinum".into(),
            ..Customer::new(" ")
        }))
        .unwrap();

    let outcome = session.execute().unwrap();

    assert_eq!(outcome.status, ExecuteActionsResultStatus::Fail);
    assert_eq!(
        outcome.find(bad).unwrap().result.message(),
        Some("customer name is required; unknown tier 'platinum'")
    );
    assert!(outcome.find(good).unwrap().result.success);
    assert_eq!(backend.calls(), 0);
    assert_eq!(after_rules.load(Ordering::SeqCst), 0);
}

#[test]
fn first_failing_validator_wins() {
    let backend = MemoryBackend::new("sql");
    let after_rules = Arc::new(AtomicUsize::new(0));
    let mut session = PersistenceSession::builder(source_for(&backend))
        .validator(chain(&after_rules))
        .build();
    // Keyless update: rejected by the first validator even though the
    // instance also breaks entity rules
    let id = session
        .register_action(
            ActionRequest::new(ActionType::Update, "Crm.Customer", "Sql")
                .instance(instance(Customer::new(""))),
        )
        .unwrap();

    let outcome = session.execute().unwrap();

    assert_eq!(
        outcome.find(id).unwrap().result.message(),
        Some("Update Crm.Customer carries no key parameter")
    );
    assert_eq!(after_rules.load(Ordering::SeqCst), 0);
}

#[test]
fn valid_batch_runs_every_validator() {
    let backend = MemoryBackend::new("sql");
    let after_rules = Arc::new(AtomicUsize::new(0));
    let mut session = PersistenceSession::builder(source_for(&backend))
        .validator(chain(&after_rules))
        .build();
    session.insert(instance(Customer::new("Quin"))).unwrap();

    assert!(session.execute().unwrap().is_success());
    assert_eq!(after_rules.load(Ordering::SeqCst), 1);
    assert_eq!(backend.calls(), 1);
}
