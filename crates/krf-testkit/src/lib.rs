//! In-process doubles for the refill run.
//!
//! `InMemoryKeyStore` applies the same eligibility rules as the Postgres query
//! and `RecordingAuditSink` keeps every ingested event, so scenario tests can
//! drive `RefillRun` without a database or network.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use krf_audit::{AuditEvent, AuditSink, ResourceKind};
use krf_refill::KeyStore;
use krf_schemas::{DayCondition, Key};
use std::collections::HashSet;
use std::sync::Mutex;

/// One `refill` call seen by the store, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillCall {
    pub key_id: String,
    pub amount: i64,
    pub refilled_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: Mutex<Vec<Key>>,
    calls: Mutex<Vec<RefillCall>>,
    fail_query: bool,
    fail_refill: HashSet<String>,
}

impl InMemoryKeyStore {
    pub fn new(keys: Vec<Key>) -> Self {
        Self {
            keys: Mutex::new(keys),
            ..Self::default()
        }
    }

    /// Every `find_due` returns an error.
    pub fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// `refill` errors for this key id and leaves the key untouched.
    pub fn failing_refill_for(mut self, key_id: &str) -> Self {
        self.fail_refill.insert(key_id.to_string());
        self
    }

    pub fn key(&self, key_id: &str) -> Option<Key> {
        let keys = self.keys.lock().unwrap_or_else(|p| p.into_inner());
        keys.iter().find(|k| k.id == key_id).cloned()
    }

    pub fn refill_calls(&self) -> Vec<RefillCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn find_due(&self, cond: DayCondition) -> Result<Vec<Key>> {
        if self.fail_query {
            bail!("injected query failure");
        }
        let keys = self.keys.lock().unwrap_or_else(|p| p.into_inner());
        let mut due: Vec<Key> = keys
            .iter()
            .filter(|k| k.is_refill_candidate() && cond.admits(k.refill_day))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }

    async fn refill(&self, key_id: &str, amount: i64, refilled_at: DateTime<Utc>) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RefillCall {
                key_id: key_id.to_string(),
                amount,
                refilled_at,
            });

        if self.fail_refill.contains(key_id) {
            bail!("injected update failure for {key_id}");
        }

        let mut keys = self.keys.lock().unwrap_or_else(|p| p.into_inner());
        let Some(key) = keys
            .iter_mut()
            .find(|k| k.id == key_id && k.deleted_at.is_none())
        else {
            bail!("refill_key affected 0 rows (key missing or deleted) key_id={key_id}");
        };
        key.remaining = amount;
        key.last_refill_at = Some(refilled_at);
        Ok(())
    }
}

/// Audit sink that records events in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    fail_for: HashSet<String>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject events whose key resource is `key_id`. Rejected events are not recorded.
    pub fn failing_for(mut self, key_id: &str) -> Self {
        self.fail_for.insert(key_id.to_string());
        self
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn events_for_key(&self, key_id: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.references(ResourceKind::Key, key_id))
            .collect()
    }
}

#[async_trait::async_trait]
impl AuditSink for RecordingAuditSink {
    fn sink_name(&self) -> &'static str {
        "recording"
    }

    async fn ingest(&self, event: &AuditEvent) -> Result<()> {
        if self
            .fail_for
            .iter()
            .any(|id| event.references(ResourceKind::Key, id))
        {
            bail!("injected ingest failure");
        }
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Test key builder: live, below its amount, in workspace `ws_test`.
pub fn key(id: &str, refill_amount: Option<i64>, remaining: i64, refill_day: Option<i32>) -> Key {
    Key {
        id: id.to_string(),
        workspace_id: "ws_test".to_string(),
        refill_amount,
        remaining,
        refill_day,
        last_refill_at: None,
        deleted_at: None,
    }
}

/// Parse an RFC3339 timestamp; panics on bad input.
pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
}
