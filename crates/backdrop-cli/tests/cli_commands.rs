// crates/backdrop-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the backdrop binary.
// Purpose: Ensure each subcommand fails closed and produces the documented output.
// Dependencies: backdrop-cli binary
// ============================================================================
//! ## Overview
//! Runs the compiled `backdrop` binary against temporary files. The serve
//! command must refuse non-loopback binds before any socket is opened.
//!
//! Security posture: local-only is the default; fail closed.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn backdrop_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_backdrop"))
}

fn backdrop_command() -> Command {
    let mut command = Command::new(backdrop_bin());
    command.env_remove("BACKDROP_ALLOW_NON_LOOPBACK").env_remove("BACKDROP_CONFIG");
    command
}

fn temp_root(label: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock drift").as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("backdrop-cli-{label}-{nanos}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_dir_all(path);
}

// ============================================================================
// SECTION: Serve
// ============================================================================

/// Verifies non-loopback binds are rejected before server startup.
#[test]
fn cli_serve_rejects_non_loopback_bind() {
    let root = temp_root("serve");
    let config_path = root.join("backdrop.toml");
    fs::write(&config_path, "[server]\nbind = \"0.0.0.0:3000\"\n").expect("write config");

    let output = backdrop_command()
        .args(["serve", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop serve");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("non-loopback"), "stderr: {stderr}");

    cleanup(&root);
}

/// Verifies an invalid truthy env value is reported rather than ignored.
#[test]
fn cli_serve_rejects_invalid_opt_in_env() {
    let root = temp_root("serve-env");
    let config_path = root.join("backdrop.toml");
    fs::write(&config_path, "[server]\nbind = \"0.0.0.0:3000\"\n").expect("write config");

    let output = backdrop_command()
        .env("BACKDROP_ALLOW_NON_LOOPBACK", "maybe")
        .args(["serve", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop serve");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("BACKDROP_ALLOW_NON_LOOPBACK"), "stderr: {stderr}");

    cleanup(&root);
}

/// Verifies a missing explicit config path is an error.
#[test]
fn cli_serve_fails_for_missing_config() {
    let root = temp_root("serve-missing");
    let config_path = root.join("absent.toml");

    let output = backdrop_command()
        .args(["serve", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop serve");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load config"), "stderr: {stderr}");

    cleanup(&root);
}

// ============================================================================
// SECTION: Config
// ============================================================================

#[test]
fn cli_config_validate_accepts_valid_file() {
    let root = temp_root("config-ok");
    let config_path = root.join("backdrop.toml");
    let config = r#"
[server]
bind = "127.0.0.1:3100"
max_inflight = 8

[origin]
allowed_origin = "https://steamcommunity.com/"

[fetch]
timeout_ms = 5000
"#;
    fs::write(&config_path, config.trim()).expect("write config");

    let output = backdrop_command()
        .args(["config", "validate", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop config validate");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "config ok");

    cleanup(&root);
}

#[test]
fn cli_config_validate_rejects_invalid_file() {
    let root = temp_root("config-bad");
    let config_path = root.join("backdrop.toml");
    fs::write(&config_path, "[server]\nmax_inflight = 0\n").expect("write config");

    let output = backdrop_command()
        .args(["config", "validate", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop config validate");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_inflight"), "stderr: {stderr}");

    cleanup(&root);
}

// ============================================================================
// SECTION: Sanitize
// ============================================================================

#[test]
fn cli_sanitize_strips_active_content() {
    let root = temp_root("sanitize");
    let input = root.join("profile.html");
    let html = r#"<html><head><script>alert(1)</script></head>
<body><div class="profile_page" onclick="steal()"><a href="javascript:run()">x</a>
<p>Hello</p></div></body></html>"#;
    fs::write(&input, html).expect("write input");

    let output = backdrop_command()
        .args(["sanitize", "--input", input.to_string_lossy().as_ref()])
        .output()
        .expect("run backdrop sanitize");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hello"));
    assert!(stdout.contains(r#"<base href="https://steamcommunity.com/">"#), "stdout: {stdout}");
    assert!(!stdout.contains("<script"));
    assert!(!stdout.contains("onclick"));
    assert!(!stdout.contains("javascript:"));

    cleanup(&root);
}

#[test]
fn cli_sanitize_rejects_disallowed_origin_scheme() {
    let root = temp_root("sanitize-origin");
    let input = root.join("profile.html");
    fs::write(&input, "<p>x</p>").expect("write input");

    let output = backdrop_command()
        .args([
            "sanitize",
            "--input",
            input.to_string_lossy().as_ref(),
            "--origin",
            "ftp://steamcommunity.com/",
        ])
        .output()
        .expect("run backdrop sanitize");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid origin"), "stderr: {stderr}");

    cleanup(&root);
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

#[test]
fn cli_catalog_build_filters_and_dedupes() {
    let root = temp_root("catalog");
    let input = root.join("scraped.txt");
    let output_path = root.join("steam_backgrounds.json");
    let scraped = "\
https://cdn.example.com/items/1/profilebackground_a.jpg?size=full
https://cdn.example.com/items/1/profilebackground_a.jpg
https://cdn.example.com/items/2/avatar.png
https://cdn.example.com/items/3/profilebackground_b.webm
";
    fs::write(&input, scraped).expect("write input");

    let output = backdrop_command()
        .args([
            "catalog",
            "build",
            "--input",
            input.to_string_lossy().as_ref(),
            "--output",
            output_path.to_string_lossy().as_ref(),
        ])
        .output()
        .expect("run backdrop catalog build");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let written = fs::read_to_string(&output_path).expect("read catalog");
    let entries: Vec<String> = serde_json::from_str(&written).expect("parse catalog");
    assert_eq!(
        entries,
        vec![
            "https://cdn.example.com/items/1/profilebackground_a.jpg".to_string(),
            "https://cdn.example.com/items/3/profilebackground_b.webm".to_string(),
        ]
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wrote 2 backgrounds"), "stdout: {stdout}");

    cleanup(&root);
}
