use crate::error::UpdateError;
use crate::store::KeyStore;
use chrono::{DateTime, Utc};
use krf_schemas::Key;

/// What a successful refill wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedRefill {
    pub amount: i64,
    pub refilled_at: DateTime<Utc>,
}

/// Reset `key.remaining` to its refill amount and stamp `last_refill_at`.
///
/// The timestamp written is never earlier than `reference`. There is no
/// optimistic-concurrency check: a concurrent writer to the same key wins or
/// loses by ordering alone.
pub async fn refill_key(
    store: &dyn KeyStore,
    key: &Key,
    reference: DateTime<Utc>,
) -> Result<AppliedRefill, UpdateError> {
    let Some(amount) = key.refill_amount else {
        return Err(UpdateError {
            key_id: key.id.clone(),
            detail: "key has no refill_amount".to_string(),
        });
    };

    let refilled_at = Utc::now().max(reference);
    store
        .refill(&key.id, amount, refilled_at)
        .await
        .map_err(|e| UpdateError {
            key_id: key.id.clone(),
            detail: format!("{e:#}"),
        })?;

    Ok(AppliedRefill {
        amount,
        refilled_at,
    })
}
