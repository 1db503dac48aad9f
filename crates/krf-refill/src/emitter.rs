use crate::error::AuditIngestError;
use chrono::{DateTime, Utc};
use krf_audit::{Actor, AuditContext, AuditEvent, AuditSink};
use krf_schemas::Key;

/// Builds and ingests the `key.update` record for a refill.
#[derive(Debug, Clone)]
pub struct AuditEmitter {
    actor: Actor,
    context: AuditContext,
}

impl AuditEmitter {
    /// System actor `actor_id`, context tagged with `location`.
    pub fn new(actor_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            actor: Actor::system(actor_id),
            context: AuditContext::location(location),
        }
    }

    pub fn refill_event(&self, key: &Key, amount: i64, at: DateTime<Utc>) -> AuditEvent {
        AuditEvent::key_update(
            self.actor.clone(),
            &key.workspace_id,
            &key.id,
            format!("Refilled {} to {}", key.id, amount),
            self.context.clone(),
            at,
        )
    }

    /// Append exactly one audit record for a refill that already landed.
    pub async fn emit(
        &self,
        sink: &dyn AuditSink,
        key: &Key,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<AuditEvent, AuditIngestError> {
        let event = self.refill_event(key, amount, at);
        sink.ingest(&event).await.map_err(|e| AuditIngestError {
            key_id: key.id.clone(),
            sink: sink.sink_name(),
            detail: format!("{e:#}"),
        })?;
        Ok(event)
    }
}

impl Default for AuditEmitter {
    fn default() -> Self {
        Self::new("trigger", "trigger")
    }
}
