use crate::error::StoreQueryError;
use crate::store::KeyStore;
use krf_schemas::{DayClass, Key};

/// Full due-key predicate for one run day.
pub fn is_due(key: &Key, class: &DayClass) -> bool {
    key.is_refill_candidate() && class.day_condition().admits(key.refill_day)
}

/// Query the store for keys due under `class`.
///
/// A store failure is never treated as "no keys due".
pub async fn select_due(
    store: &dyn KeyStore,
    class: &DayClass,
) -> Result<Vec<Key>, StoreQueryError> {
    store
        .find_due(class.day_condition())
        .await
        .map_err(|e| StoreQueryError {
            class: *class,
            detail: format!("{e:#}"),
        })
}
