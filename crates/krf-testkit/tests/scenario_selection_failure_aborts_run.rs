//! Scenario: A failed due-key query aborts the run before any mutation.
//!
//! # Invariant under test
//! When selection fails the run returns `StoreQueryError`, performs zero
//! refills, and emits zero audit events.

use krf_refill::RefillRun;
use krf_testkit::{key, ts, InMemoryKeyStore, RecordingAuditSink};

#[tokio::test]
async fn query_error_means_no_refills_and_no_audits() {
    let store = InMemoryKeyStore::new(vec![key("key_due", Some(100), 0, None)]).failing_query();
    let sink = RecordingAuditSink::new();

    let err = RefillRun::new(&store, &sink)
        .execute(ts("2024-02-29T00:00:00Z"))
        .await
        .expect_err("selection failure must abort");

    assert!(err.class.is_end_of_month);
    assert_eq!(err.class.today, 29);
    assert!(err.to_string().contains("STORE_QUERY_FAILED"));
    assert!(err.detail.contains("injected query failure"));

    assert!(store.refill_calls().is_empty());
    assert!(sink.events().is_empty());
    assert_eq!(store.key("key_due").map(|k| k.remaining), Some(0));
}
