use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn zmanim() -> Command {
    Command::cargo_bin("zmanim").unwrap()
}

fn preview_json(extra: &[&str]) -> Vec<serde_json::Value> {
    let output = zmanim()
        .args(["preview", "--rules"])
        .arg(fixture("rules.json"))
        .args(["--from", "2024-01-08", "--through", "2024-01-11", "--json"])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_times_lists_every_reference_point() {
    let output = zmanim()
        .args(["times", "--date", "2024-06-21", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0]["reference"], "alos");
    assert_eq!(rows[10]["reference"], "sunset");
    assert!(rows[10]["time"].as_str().unwrap().ends_with("PM"));
}

#[test]
fn test_times_table_names_location() {
    zmanim()
        .args(["times", "--date", "2024-06-21"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lakewood, NJ"))
        .stdout(predicate::str::contains("Plag Hamincha"));
}

#[test]
fn test_times_uses_configured_location() {
    zmanim()
        .args(["times", "--date", "2024-06-21", "--config"])
        .arg(fixture("jerusalem.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Jerusalem"));
}

#[test]
fn test_preview_with_feed_archive() {
    let rows = preview_json(&["--feed-dir", fixture("feed").to_str().unwrap()]);

    // Shacharis Mon+Thu, Hallel on Rosh Chodesh, Mincha every weekday.
    assert_eq!(rows.len(), 2 + 1 + 4);
    let hallel: Vec<_> = rows.iter().filter(|r| r["name"] == "Hallel").collect();
    assert_eq!(hallel.len(), 1);
    assert_eq!(hallel[0]["date"], "2024-01-11");
    assert_eq!(hallel[0]["time"], "7:00 AM");
    assert!(rows.iter().all(|r| r["needs_review"] == false));
}

#[test]
fn test_preview_without_feed_classifies_weekdays_only() {
    let rows = preview_json(&[]);
    assert_eq!(rows.len(), 2 + 4);
    assert!(rows.iter().all(|r| r["name"] != "Hallel"));
}

#[test]
fn test_preview_reads_archive_from_config() {
    let rows = preview_json(&["--config", fixture("jerusalem.toml").to_str().unwrap()]);
    assert!(rows.iter().any(|r| r["name"] == "Hallel"));
}

#[test]
fn test_preview_table_is_sorted_by_date_and_time() {
    zmanim()
        .args(["preview", "--rules"])
        .arg(fixture("rules.json"))
        .args(["--from", "2024-01-08", "--through", "2024-01-08"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?s)2024-01-08\s+6:00 AM\s+Shacharis.*2024-01-08\s+\d:\d\d PM\s+Mincha").unwrap());
}

#[test]
fn test_preview_rejects_reversed_range() {
    zmanim()
        .args(["preview", "--rules"])
        .arg(fixture("rules.json"))
        .args(["--from", "2024-02-01", "--through", "2024-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is after"));
}

#[test]
fn test_preview_missing_feed_year_fails() {
    zmanim()
        .args(["preview", "--rules"])
        .arg(fixture("rules.json"))
        .args(["--from", "2025-01-01", "--through", "2025-01-05", "--feed-dir"])
        .arg(fixture("feed"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("feed unavailable for 2025"));
}

#[test]
fn test_bad_timezone_in_config_fails() {
    zmanim()
        .args(["times", "--date", "2024-06-21", "--config"])
        .arg(fixture("bad-timezone.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid timezone"));
}

#[test]
fn test_rejects_malformed_date() {
    zmanim()
        .args(["times", "--date", "June 21"])
        .assert()
        .failure();
}
