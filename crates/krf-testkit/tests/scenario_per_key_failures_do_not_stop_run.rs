//! Scenario: Per-key failures are contained to that key.
//!
//! # Invariant under test
//! - A failed refill write is reported, gets no audit event, and the run
//!   moves on to the next key.
//! - A failed audit ingest is reported but the key stays in
//!   `refill_key_ids`, because its refill already landed.

use krf_refill::{FailureStage, RefillRun};
use krf_testkit::{key, ts, InMemoryKeyStore, RecordingAuditSink};

fn three_due_keys() -> Vec<krf_schemas::Key> {
    vec![
        key("key_a", Some(100), 1, None),
        key("key_b", Some(100), 2, None),
        key("key_c", Some(100), 3, None),
    ]
}

#[tokio::test]
async fn update_failure_skips_audit_and_continues() -> anyhow::Result<()> {
    let store = InMemoryKeyStore::new(three_due_keys()).failing_refill_for("key_b");
    let sink = RecordingAuditSink::new();

    let report = RefillRun::new(&store, &sink)
        .execute(ts("2024-06-12T00:00:00Z"))
        .await?;

    assert_eq!(report.refilled_key_ids, vec!["key_a", "key_c"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key_id, "key_b");
    assert_eq!(report.failures[0].stage, FailureStage::Refill);
    assert!(report.failures[0].message.contains("REFILL_UPDATE_FAILED"));

    assert!(sink.events_for_key("key_b").is_empty());
    assert_eq!(sink.events().len(), 2);
    assert_eq!(store.key("key_b").map(|k| k.remaining), Some(2));

    // key_c was attempted after key_b failed.
    let attempted: Vec<String> = store.refill_calls().into_iter().map(|c| c.key_id).collect();
    assert_eq!(attempted, vec!["key_a", "key_b", "key_c"]);
    Ok(())
}

#[tokio::test]
async fn audit_failure_keeps_key_refilled() -> anyhow::Result<()> {
    let store = InMemoryKeyStore::new(three_due_keys());
    let sink = RecordingAuditSink::new().failing_for("key_a");

    let report = RefillRun::new(&store, &sink)
        .execute(ts("2024-06-12T00:00:00Z"))
        .await?;

    assert_eq!(report.refilled_key_ids, vec!["key_a", "key_b", "key_c"]);
    let audit_failures: Vec<_> = report.failures_at(FailureStage::Audit).collect();
    assert_eq!(audit_failures.len(), 1);
    assert_eq!(audit_failures[0].key_id, "key_a");
    assert!(audit_failures[0].message.contains("sink=recording"));
    assert!(!report.is_clean());

    assert_eq!(store.key("key_a").map(|k| k.remaining), Some(100));
    assert_eq!(sink.events().len(), 2);
    Ok(())
}

#[tokio::test]
async fn report_serializes_refill_key_ids() -> anyhow::Result<()> {
    let store = InMemoryKeyStore::new(three_due_keys()).failing_refill_for("key_c");
    let sink = RecordingAuditSink::new();

    let report = RefillRun::new(&store, &sink)
        .execute(ts("2024-06-12T00:00:00Z"))
        .await?;
    let v = serde_json::to_value(&report)?;

    assert_eq!(v["refill_key_ids"], serde_json::json!(["key_a", "key_b"]));
    assert_eq!(v["failures"][0]["stage"], "refill");
    Ok(())
}
