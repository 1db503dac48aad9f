//! krf-audit
//!
//! Audit trail for key mutations: the event model, the `AuditSink` seam, and
//! the concrete sinks (hash-chained JSONL file, Tinybird events endpoint).
//! A Postgres-backed sink lives next to the other Postgres adapters in
//! `krf-refill`.

mod jsonl;
mod tinybird;

pub use jsonl::{
    compute_record_hash, verify_hash_chain, verify_hash_chain_str, AuditWriter, ChainedRecord,
    JsonlAuditSink, VerifyResult,
};
pub use tinybird::{
    TinybirdClient, DEFAULT_TINYBIRD_BASE_URL, DEFAULT_TINYBIRD_DATASOURCE, DEFAULT_TINYBIRD_TIMEOUT,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_KEY_UPDATE: &str = "key.update";

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub audit_log_id: Uuid,
    pub workspace_id: String,
    pub event: String,
    pub time: DateTime<Utc>,
    pub actor: Actor,
    pub description: String,
    pub resources: Vec<Resource>,
    pub context: AuditContext,
}

impl AuditEvent {
    /// `key.update` event attributed to `actor`, referencing the key and its workspace.
    pub fn key_update(
        actor: Actor,
        workspace_id: &str,
        key_id: &str,
        description: String,
        context: AuditContext,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_log_id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            event: EVENT_KEY_UPDATE.to_string(),
            time,
            actor,
            description,
            resources: vec![
                Resource::new(ResourceKind::Workspace, workspace_id),
                Resource::new(ResourceKind::Key, key_id),
            ],
            context,
        }
    }

    pub fn references(&self, kind: ResourceKind, id: &str) -> bool {
        self.resources.iter().any(|r| r.kind == kind && r.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    System,
    User,
    Key,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::System => "system",
            ActorKind::User => "user",
            ActorKind::Key => "key",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Actor {
    pub fn system(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::System,
            id: id.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Workspace,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub id: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Free-form origin tagging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub location: String,
    #[serde(default, rename = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            user_agent: None,
        }
    }
}

/// Destination for audit events. One call appends exactly one record.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    fn sink_name(&self) -> &'static str;

    async fn ingest(&self, event: &AuditEvent) -> Result<()>;
}
