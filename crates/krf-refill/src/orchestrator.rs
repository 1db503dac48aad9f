use crate::calendar::classify_at;
use crate::emitter::AuditEmitter;
use crate::error::{FailureStage, KeyFailure, StoreQueryError};
use crate::executor::refill_key;
use crate::selector::select_due;
use crate::store::KeyStore;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use krf_audit::AuditSink;
use krf_schemas::{DayClass, Key};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Outcome of one refill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub reference_ts: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub class: DayClass,
    /// Keys returned by the due-key selection.
    pub candidates: usize,
    /// Keys whose refill write succeeded, in processing order. Audit failures
    /// do not remove a key from this list.
    #[serde(rename = "refill_key_ids")]
    pub refilled_key_ids: Vec<String>,
    pub failures: Vec<KeyFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures_at(&self, stage: FailureStage) -> impl Iterator<Item = &KeyFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

/// Result of classifying + selecting without mutating anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillPlan {
    pub reference_ts: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub class: DayClass,
    pub due: Vec<Key>,
}

/// Classify `reference_ts` in `timezone` and select the keys due that day.
/// Mutates nothing.
pub async fn plan_refill(
    store: &dyn KeyStore,
    timezone: Tz,
    reference_ts: DateTime<Utc>,
) -> Result<RefillPlan, StoreQueryError> {
    let (local_date, class) = classify_at(reference_ts, timezone);
    info!(
        %local_date,
        today = class.today,
        last_day_of_month = class.last_day_of_month,
        end_of_month = class.is_end_of_month,
        "classified refill day"
    );
    let due = select_due(store, &class).await?;
    Ok(RefillPlan {
        reference_ts,
        local_date,
        class,
        due,
    })
}

/// One reconciliation pass over the key population.
pub struct RefillRun<'a> {
    store: &'a dyn KeyStore,
    sink: &'a dyn AuditSink,
    emitter: AuditEmitter,
    timezone: Tz,
}

impl<'a> RefillRun<'a> {
    pub fn new(store: &'a dyn KeyStore, sink: &'a dyn AuditSink) -> Self {
        Self {
            store,
            sink,
            emitter: AuditEmitter::default(),
            timezone: chrono_tz::UTC,
        }
    }

    pub fn with_emitter(mut self, emitter: AuditEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Classify and select only.
    pub async fn plan(&self, reference_ts: DateTime<Utc>) -> Result<RefillPlan, StoreQueryError> {
        plan_refill(self.store, self.timezone, reference_ts).await
    }

    /// Execute the run for the scheduler's `reference_ts`.
    ///
    /// Fails only when the due-key selection fails; per-key failures are
    /// logged and collected in [`RunReport::failures`].
    pub async fn execute(&self, reference_ts: DateTime<Utc>) -> Result<RunReport, StoreQueryError> {
        let RefillPlan {
            local_date,
            class,
            due: keys,
            ..
        } = self.plan(reference_ts).await.map_err(|e| {
            error!(error = %e, "due-key selection failed; aborting run");
            e
        })?;
        info!("found {} keys with refill set for today", keys.len());

        let mut refilled_key_ids = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();

        for key in &keys {
            let applied = match refill_key(self.store, key, reference_ts).await {
                Ok(applied) => applied,
                Err(e) => {
                    error!(key_id = %key.id, stage = "refill", error = %e, "refill failed; skipping audit");
                    failures.push(KeyFailure::from(&e));
                    continue;
                }
            };
            refilled_key_ids.push(key.id.clone());

            if let Err(e) = self
                .emitter
                .emit(self.sink, key, applied.amount, applied.refilled_at)
                .await
            {
                error!(key_id = %key.id, stage = "audit", error = %e, "audit ingest failed after refill");
                failures.push(KeyFailure::from(&e));
            }
        }

        info!(
            candidates = keys.len(),
            refilled = refilled_key_ids.len(),
            failures = failures.len(),
            "refill run complete"
        );

        Ok(RunReport {
            reference_ts,
            local_date,
            class,
            candidates: keys.len(),
            refilled_key_ids,
            failures,
        })
    }
}
