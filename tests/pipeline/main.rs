//! Pipeline Tests
//!
//! End-to-end tests of the persistence session against in-memory executors:
//! - Registration and reconciliation of inserts, updates and deletes
//! - Row-version concurrency
//! - Failure statuses, error capture and executor lifecycle
//! - Provider routing through the executor resolver
//! - Validation, sub-sessions and wire round trips


mod aggregates;
mod concurrency;
mod failures;
mod lifecycle;
mod routing;
mod validation;
