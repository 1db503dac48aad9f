use assert_cmd::Command;
use chrono::Utc;
use krf_audit::{Actor, AuditContext, AuditEvent, AuditWriter};
use predicates::prelude::*;

fn write_log(path: &std::path::Path, n: usize) -> anyhow::Result<()> {
    let mut w = AuditWriter::new(path, true)?;
    for i in 0..n {
        let key_id = format!("key_{i}");
        w.append(&AuditEvent::key_update(
            Actor::system("trigger"),
            "ws_cli",
            &key_id,
            format!("Refilled {key_id} to 100"),
            AuditContext::location("trigger"),
            Utc::now(),
        ))?;
    }
    Ok(())
}

/// `krf audit verify` accepts an intact chain and rejects an edited one.
#[test]
fn audit_verify_detects_tampering() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("refill.jsonl");
    write_log(&path, 3)?;
    let path_s = path.to_string_lossy().to_string();

    Command::cargo_bin("krf")?
        .current_dir(tmp.path())
        .args(["audit", "verify", "--path", path_s.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("audit_chain_valid=true lines=3"));

    let content = std::fs::read_to_string(&path)?;
    std::fs::write(&path, content.replacen("to 100", "to 999", 1))?;

    Command::cargo_bin("krf")?
        .current_dir(tmp.path())
        .args(["audit", "verify", "--path", path_s.as_str()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("audit_chain_valid=false line=1"))
        .stderr(predicate::str::contains("AUDIT_CHAIN_BROKEN"));
    Ok(())
}
