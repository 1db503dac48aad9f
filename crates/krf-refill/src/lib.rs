//! krf-refill
//!
//! Daily quota refill: decide which keys are due on the run's calendar day,
//! reset each one's remaining quota, and record one audit event per refill.
//!
//! Run shape (linear, no back-edges):
//! `Classify -> SelectDue -> {RefillOne -> AuditOne}* -> Complete`
//!
//! - Selection failure aborts the whole run (no partial result).
//! - A refill failure skips that key's audit and moves on.
//! - An audit failure after a refill keeps the key in the refilled list.
//!
//! Storage and audit transport sit behind [`KeyStore`] and
//! [`krf_audit::AuditSink`]; the Postgres implementations live in [`pg`].

mod calendar;
mod emitter;
mod error;
mod executor;
mod orchestrator;
pub mod pg;
mod selector;
mod store;

pub use calendar::{classify, classify_at, days_in_month, is_leap_year};
pub use emitter::AuditEmitter;
pub use error::{AuditIngestError, FailureStage, KeyFailure, StoreQueryError, UpdateError};
pub use executor::{refill_key, AppliedRefill};
pub use orchestrator::{plan_refill, RefillPlan, RefillRun, RunReport};
pub use selector::{is_due, select_due};
pub use store::KeyStore;

pub use krf_schemas::{DayClass, DayCondition, Key};
