//! Postgres-backed adapters for [`KeyStore`] and [`AuditSink`].

use crate::store::KeyStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use krf_audit::{AuditEvent, AuditSink};
use krf_schemas::{DayCondition, Key};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgKeyStore {
    pool: PgPool,
}

impl PgKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KeyStore for PgKeyStore {
    async fn find_due(&self, cond: DayCondition) -> Result<Vec<Key>> {
        krf_db::fetch_due_keys(&self.pool, cond).await
    }

    async fn refill(&self, key_id: &str, amount: i64, refilled_at: DateTime<Utc>) -> Result<()> {
        krf_db::refill_key(&self.pool, key_id, amount, refilled_at).await
    }
}

/// Appends audit events to the `audit_logs` table.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_row(ev: &AuditEvent) -> Result<krf_db::NewAuditLog> {
    Ok(krf_db::NewAuditLog {
        audit_log_id: ev.audit_log_id,
        workspace_id: ev.workspace_id.clone(),
        event: ev.event.clone(),
        time_utc: ev.time,
        actor_type: ev.actor.kind.as_str().to_string(),
        actor_id: ev.actor.id.clone(),
        description: ev.description.clone(),
        resources: serde_json::to_value(&ev.resources).context("serialize resources failed")?,
        context: serde_json::to_value(&ev.context).context("serialize context failed")?,
    })
}

#[async_trait::async_trait]
impl AuditSink for PgAuditSink {
    fn sink_name(&self) -> &'static str {
        "postgres"
    }

    async fn ingest(&self, event: &AuditEvent) -> Result<()> {
        let row = to_row(event)?;
        krf_db::insert_audit_log(&self.pool, &row).await
    }
}
