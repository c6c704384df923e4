//! Integration tests for the xagg binary.
//!
//! Each test points the binary at a throwaway settings file so it never
//! touches the built-in data locations.

use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Write a settings file whose every location lives under `root`.
fn write_settings(root: &Path) -> std::path::PathBuf {
    let data = root.join("data");
    std::fs::create_dir_all(data.join("modelX/v1")).unwrap();
    std::fs::write(data.join("modelX/v1/tas.nc"), b"cdf").unwrap();

    let settings = json!({
        "database": root.join("xml.db"),
        "metadataCache": root.join("cmipMeta.json"),
        "tablesDirectory": root.join("tables"),
        "lockDirectory": root,
        "dataDirectories": [data],
        "splitDirectories": [],
        "excludedDirectories": [],
        "outputDirectory": root.join("xml"),
        "archiveDirectory": root.join("retracted"),
        "workers": 2,
        "tool": "/nonexistent/cdscan"
    });
    let path = root.join("settings.json");
    std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
    path
}

fn xagg(settings: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xagg"))
        .arg("--settings")
        .arg(settings)
        .args(args)
        .output()
        .expect("Failed to run xagg")
}

#[test]
fn test_run_records_ledger_row() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    let output = xagg(&settings, &["run"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(!temp_dir.path().join("xagg.lock").exists());

    let output = xagg(&settings, &["runs", "--json"]);
    assert!(output.status.success());
    let runs: Value = serde_json::from_slice(&output.stdout).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["total"], 1);
    // the stand-in path layout does not resolve without CMOR tables
    assert_eq!(runs[0]["invalid"], 1);
}

#[test]
fn test_held_lock_exits_with_code_two() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());
    std::fs::write(temp_dir.path().join("xagg.lock"), "1 earlier run").unwrap();

    let output = xagg(&settings, &["run"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(temp_dir.path().join("xagg.lock").exists());
}

#[test]
fn test_unrestricted_purge_refused() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    let output = xagg(&settings, &["purge"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!temp_dir.path().join("xml.db").exists());
}
