use anyhow::Result;
use chrono::{DateTime, Utc};
use krf_schemas::{DayCondition, Key};

/// Key persistence used by the refill run.
///
/// # Contract
/// - `find_due` returns every key that is not deleted, has a refill amount,
///   is below it, and whose `refill_day` is unset or satisfies `cond`.
///   Order should be stable (by id).
/// - `refill` mutates exactly one key, addressed by id. A missing or deleted
///   key is an error.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    async fn find_due(&self, cond: DayCondition) -> Result<Vec<Key>>;

    async fn refill(&self, key_id: &str, amount: i64, refilled_at: DateTime<Utc>) -> Result<()>;
}
