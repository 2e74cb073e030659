//! CLI integration tests.
//!
//! Runs the `observa` binary against a temporary SQLite database.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

fn id(n: u128) -> String {
    Uuid::from_u128(n).to_string()
}

/// Get the CLI binary command against `dir`'s database
#[allow(deprecated)]
fn observa_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("observa").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.join("missing.toml"))
        .arg("--database")
        .arg(dir.join("observa.db"));
    cmd
}

/// One subject, one filter (Primary, Secondary), two locations, one year.
fn fixture() -> Value {
    let mut observations = Vec::new();
    let mut next = 100;
    for location in [10, 11] {
        for item in [3, 4] {
            next += 1;
            observations.push(json!({
                "id": id(next),
                "subject_id": id(1),
                "location_id": id(location),
                "year": 2020,
                "time_identifier": "AY",
                "filter_item_ids": [id(item)],
                "measures": { id(5): format!("{}", next * 3) }
            }));
        }
    }
    json!({
        "subjects": [{
            "id": id(1),
            "name": "Exclusions",
            "filters": [{
                "id": id(2),
                "label": "Phase",
                "name": "phase",
                "groups": [{
                    "id": id(6),
                    "label": "Default",
                    "items": [
                        { "id": id(3), "label": "Primary" },
                        { "id": id(4), "label": "Secondary" }
                    ]
                }]
            }],
            "indicator_groups": [{
                "id": id(7),
                "label": "Exclusions",
                "indicators": [{ "id": id(5), "label": "Permanent exclusions", "name": "perm_excl" }]
            }]
        }],
        "locations": [
            { "id": id(10), "geographic_level": "LocalAuthority", "code": "E09000001", "name": "City of London", "old_code": "201" },
            { "id": id(11), "geographic_level": "LocalAuthority", "code": "E09000002", "name": "Barking and Dagenham", "old_code": "301" }
        ],
        "observations": observations
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn imported() -> TempDir {
    let dir = TempDir::new().unwrap();
    let fixture = write_json(dir.path(), "fixture.json", &fixture());
    observa_cmd(dir.path())
        .arg("import")
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 observations"));
    dir
}

// =============================================================================
// Help & Version Tests
// =============================================================================

#[test]
fn test_help_displays_usage() {
    let dir = TempDir::new().unwrap();
    observa_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Observa CLI"))
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_command_shows_error() {
    let dir = TempDir::new().unwrap();
    observa_cmd(dir.path())
        .arg("invalid_command_xyz")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// =============================================================================
// Init & Import Tests
// =============================================================================

#[test]
fn test_init_creates_database() {
    let dir = TempDir::new().unwrap();

    observa_cmd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialised database"));

    assert!(dir.path().join("observa.db").exists());
}

#[test]
fn test_import_twice_is_rejected() {
    let dir = imported();
    let fixture = dir.path().join("fixture.json");

    observa_cmd(dir.path())
        .arg("import")
        .arg(&fixture)
        .assert()
        .failure()
        .stderr(predicate::str::contains("OBS-008"));
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_query_as_json_filters_by_item_and_legacy_code() {
    let dir = imported();
    let query = write_json(
        dir.path(),
        "query.json",
        &json!({
            "subject_id": id(1),
            "locations": { "codes": { "LocalAuthority": ["301"] } },
            "filter_item_ids": [id(4)]
        }),
    );

    let output = observa_cmd(dir.path())
        .arg("query")
        .arg(&query)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = body["observations"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(id(104)));
    assert_eq!(rows[0]["location"]["old_code"], json!("301"));
    assert_eq!(body["cropped"], json!(false));
}

#[test]
fn test_query_as_table_labels_indicators() {
    let dir = imported();
    let query = write_json(dir.path(), "query.json", &json!({ "subject_id": id(1) }));

    observa_cmd(dir.path())
        .arg("query")
        .arg(&query)
        .assert()
        .success()
        .stdout(predicate::str::contains("Permanent exclusions"))
        .stdout(predicate::str::contains("City of London"))
        .stdout(predicate::str::contains("4 observations"));
}

#[test]
fn test_unknown_subject_fails() {
    let dir = imported();
    let query = write_json(dir.path(), "query.json", &json!({ "subject_id": id(999) }));

    observa_cmd(dir.path())
        .arg("query")
        .arg(&query)
        .assert()
        .failure()
        .stderr(predicate::str::contains("OBS-001"));
}

#[test]
fn test_estimate_as_json() {
    let dir = imported();
    let query = write_json(dir.path(), "query.json", &json!({ "subject_id": id(1) }));

    let output = observa_cmd(dir.path())
        .arg("estimate")
        .arg(&query)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["estimate"], json!(2));
    assert_eq!(report["cropping_required"], json!(false));
}

#[test]
fn test_plan_lists_eliminations() {
    let dir = imported();
    let query = write_json(
        dir.path(),
        "query.json",
        &json!({ "subject_id": id(1), "filter_item_ids": [id(3)] }),
    );

    observa_cmd(dir.path())
        .arg("plan")
        .arg(&query)
        .assert()
        .success()
        .stdout(predicate::str::contains("EXISTS"))
        .stdout(predicate::str::contains(id(2)));
}
