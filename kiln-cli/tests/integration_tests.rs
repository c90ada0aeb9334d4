//! Integration tests for the Kiln CLI.
//!
//! Tests end-to-end command behavior using the CLI binary.
//! Uses tempfile for isolated test directories. None of these tests needs
//! an Electron install: scan is side-effect free, and protect runs are
//! pointed at a deliberately missing host so they fail before touching
//! anything.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get the path to the kiln binary (built by cargo).
fn kiln_binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kiln"))
}

/// Run kiln with the given args in the specified directory.
///
/// ELECTRON_EXEC_PATH is pinned to a nonexistent file so host discovery
/// fails deterministically even on machines that have electron on PATH.
fn run_kiln(dir: &Path, args: &[&str]) -> Output {
    kiln_binary()
        .current_dir(dir)
        .env("ELECTRON_EXEC_PATH", "/nonexistent/electron-binary")
        .args(args)
        .output()
        .expect("Failed to execute kiln command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Create a minimal bundler output directory.
fn setup_bundle(dir: &Path) {
    fs::write(dir.join("index.js"), "require('./foo.js');\n").unwrap();
    fs::write(dir.join("foo.js"), "module.exports = 42;\n").unwrap();
    fs::write(dir.join("bar.js"), "module.exports = 'bar';\n").unwrap();
}

// ============================================================================
// Scan Command Tests
// ============================================================================

#[test]
fn test_scan_lists_chunks() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());

    let output = run_kiln(dir.path(), &["scan", ".", "--alias", "foo"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("index"));
    assert!(out.contains("foo"));
    assert!(out.contains("bar"));
    assert!(out.contains("3 chunks, 1 eligible"));
}

#[test]
fn test_scan_json_output() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());

    let output = run_kiln(dir.path(), &["scan", ".", "--alias", "foo", "--format", "json"]);
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let chunks = parsed["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 3);
    let foo = chunks.iter().find(|c| c["id"] == "foo").unwrap();
    assert_eq!(foo["eligible"], true);
}

#[test]
fn test_scan_modifies_nothing() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());
    let before = fs::read(dir.path().join("foo.js")).unwrap();

    run_kiln(dir.path(), &["scan", ".", "--alias", "foo"]);

    assert_eq!(fs::read(dir.path().join("foo.js")).unwrap(), before);
    assert!(!dir.path().join("foo.jsc").exists());
    assert!(!dir.path().join("bytecode-loader.cjs").exists());
}

#[test]
fn test_scan_uses_kilnrc_aliases() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());
    fs::write(
        dir.path().join(".kilnrc.toml"),
        "[bytecode]\nchunk_alias = [\"bar\"]\n",
    )
    .unwrap();

    let output = run_kiln(dir.path(), &["scan", "."]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("1 eligible"));
}

// ============================================================================
// Protect Command Tests
// ============================================================================

#[test]
fn test_protect_without_alias_is_config_error() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());

    let output = run_kiln(dir.path(), &["protect", "."]);
    assert!(!output.status.success());
    assert!(stderr(&output).to_lowercase().contains("chunk_alias"));

    // Nothing was touched.
    assert!(!dir.path().join("foo.jsc").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("foo.js")).unwrap(),
        "module.exports = 42;\n"
    );
}

#[test]
fn test_protect_without_host_fails_before_touching_files() {
    let dir = TempDir::new().unwrap();
    setup_bundle(dir.path());
    let before = fs::read(dir.path().join("foo.js")).unwrap();

    let output = run_kiln(dir.path(), &["protect", ".", "--alias", "foo"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("ELECTRON_EXEC_PATH"));

    assert_eq!(fs::read(dir.path().join("foo.js")).unwrap(), before);
    assert!(!dir.path().join("foo.jsc").exists());
    assert!(!dir.path().join("bytecode-loader.cjs").exists());
}

#[test]
fn test_protect_rejects_missing_dir() {
    let dir = TempDir::new().unwrap();
    let output = run_kiln(dir.path(), &["protect", "does-not-exist", "--alias", "foo"]);
    assert!(!output.status.success());
}

// ============================================================================
// Doctor Command Tests
// ============================================================================

#[test]
fn test_doctor_reports_missing_host() {
    let dir = TempDir::new().unwrap();

    let output = run_kiln(dir.path(), &["doctor", "."]);
    // Diagnostics never fail the command; problems are check items.
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("Electron binary"));
    assert!(out.contains("Chunk aliases"));
}

#[test]
fn test_doctor_json_output() {
    let dir = TempDir::new().unwrap();

    let output = run_kiln(dir.path(), &["doctor", ".", "--format", "json"]);
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(parsed["checks"].as_array().unwrap().len() >= 2);
}

// ============================================================================
// General CLI Tests
// ============================================================================

#[test]
fn test_no_command_prints_help() {
    let output = kiln_binary().output().expect("Failed to execute kiln");
    assert!(output.status.success());
    assert!(stdout(&output).contains("protect"));
}

#[test]
fn test_version_flag() {
    let output = kiln_binary()
        .arg("--version")
        .output()
        .expect("Failed to execute kiln");
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}
