use assert_cmd::Command;
use predicates::prelude::*;

/// `krf calendar` reports leap-day end of month and the >= day condition.
#[test]
fn calendar_leap_day_is_end_of_month() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("krf")
        .unwrap()
        .current_dir(tmp.path())
        .args(["calendar", "--at", "2024-02-29"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local_date=2024-02-29"))
        .stdout(predicate::str::contains("last_day_of_month=29"))
        .stdout(predicate::str::contains("end_of_month=true"))
        .stdout(predicate::str::contains(r#""kind":"at_least""#));
}

#[test]
fn calendar_mid_month_uses_exact_day() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("krf")
        .unwrap()
        .current_dir(tmp.path())
        .args(["calendar", "--at", "2024-03-15T10:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("today=15"))
        .stdout(predicate::str::contains("end_of_month=false"))
        .stdout(predicate::str::contains(r#""kind":"exactly""#));
}

#[test]
fn calendar_respects_timezone() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("krf")
        .unwrap()
        .current_dir(tmp.path())
        .args([
            "calendar",
            "--at",
            "2024-03-01T03:00:00Z",
            "--tz",
            "America/New_York",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("local_date=2024-02-29"))
        .stdout(predicate::str::contains("end_of_month=true"));
}

#[test]
fn calendar_rejects_bad_input() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("krf")
        .unwrap()
        .current_dir(tmp.path())
        .args(["calendar", "--at", "29/02/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339 or YYYY-MM-DD"));

    Command::cargo_bin("krf")
        .unwrap()
        .current_dir(tmp.path())
        .args(["calendar", "--tz", "Mars/Olympus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --tz"));
}
