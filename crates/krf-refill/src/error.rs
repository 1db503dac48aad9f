use krf_schemas::DayClass;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Due-key selection failed. Fatal: the run processes no keys.
#[derive(Debug, Error)]
#[error(
    "STORE_QUERY_FAILED selecting due keys (today={}, last_day_of_month={}, end_of_month={}): {detail}",
    .class.today, .class.last_day_of_month, .class.is_end_of_month
)]
pub struct StoreQueryError {
    pub class: DayClass,
    /// Full context chain of the store error.
    pub detail: String,
}

/// One key's refill write failed. The key is skipped for audit; the run continues.
#[derive(Debug, Error)]
#[error("REFILL_UPDATE_FAILED key_id={key_id}: {detail}")]
pub struct UpdateError {
    pub key_id: String,
    pub detail: String,
}

/// Audit ingestion failed after a successful refill. The key stays refilled.
#[derive(Debug, Error)]
#[error("AUDIT_INGEST_FAILED key_id={key_id} sink={sink} (refill already applied): {detail}")]
pub struct AuditIngestError {
    pub key_id: String,
    pub sink: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Refill,
    Audit,
}

/// Per-key failure recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    pub key_id: String,
    pub stage: FailureStage,
    pub message: String,
}

impl From<&UpdateError> for KeyFailure {
    fn from(e: &UpdateError) -> Self {
        Self {
            key_id: e.key_id.clone(),
            stage: FailureStage::Refill,
            message: e.to_string(),
        }
    }
}

impl From<&AuditIngestError> for KeyFailure {
    fn from(e: &AuditIngestError) -> Self {
        Self {
            key_id: e.key_id.clone(),
            stage: FailureStage::Audit,
            message: e.to_string(),
        }
    }
}
