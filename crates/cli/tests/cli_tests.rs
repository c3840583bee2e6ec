//! CLI integration tests

use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the built binary with an isolated home directory
fn benchctl(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_benchctl"))
        .args(args)
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("BENCH_AGENT_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Benchmark Agent"), "Should show app name");
    for command in ["create", "list", "status", "wait", "intensity", "delete"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("--agent-url"), "Should show agent-url option");
    assert!(stdout.contains("BENCH_AGENT_URL"), "Should show env var");
    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("benchctl"), "Should show binary name");
}

/// Test wait subcommand help
#[test]
fn test_wait_help() {
    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["wait", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Wait help should succeed");
    assert!(stdout.contains("--timeout"), "Should show timeout option");
    assert!(stdout.contains("--interval"), "Should show interval option");
}

/// Test delete requires a name or --all
#[test]
fn test_delete_requires_target() {
    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["delete"]);

    assert!(!output.status.success(), "Delete without target should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required"), "Should show error about missing argument");

    let output = benchctl(&home, &["delete", "cpu-burn", "--all"]);
    assert!(!output.status.success(), "Name and --all together should fail");
}

/// Test intensity outside 0-100 is rejected before any request
#[test]
fn test_intensity_out_of_range() {
    let home = TempDir::new().unwrap();
    let output = benchctl(
        &home,
        &["--agent-url", "http://127.0.0.1:9", "intensity", "cpu-burn", "150"],
    );

    assert!(!output.status.success(), "Out of range intensity should fail");
    assert_eq!(output.status.code(), Some(2), "Should be a usage error");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "Should show error message");
}

/// Test list against a mock agent
#[test]
fn test_list_against_agent() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/benchmarks")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"error":false,"data":{"cpu-burn":{"name":"cpu-burn","benchmark":{"name":"cpu-burn","image":"bench/stress:v2","count":3,"intensity":50},"nameToId":{"cpu-burn1":"a","cpu-burn2":"b","cpu-burn3":"c"},"state":"DEPLOYED","createdAt":1700000000,"updatedAt":1700000000}}}"#,
        )
        .create();

    let home = TempDir::new().unwrap();
    let output = benchctl(&home, &["--agent-url", &server.url(), "list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success(), "List should succeed");
    assert!(stdout.contains("cpu-burn"), "Should list the benchmark");
    assert!(stdout.contains("3/3"), "Should show replica count");
    assert!(stdout.contains("DEPLOYED"), "Should show state");
}

/// Test the agent URL is read from the config file
#[test]
fn test_agent_url_from_config_file() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("DELETE", "/benchmarks/cpu-burn")
        .with_status(202)
        .with_body(r#"{"error":false}"#)
        .create();

    let home = TempDir::new().unwrap();
    let config_dir = home.path().join(".config").join("benchctl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.json"),
        format!(r#"{{"agent_url": "{}", "default_format": "json"}}"#, server.url()),
    )
    .unwrap();

    let output = benchctl(&home, &["delete", "cpu-burn"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success(), "Delete should succeed");
    assert!(stdout.contains("\"error\": false"), "Should honor default format");
}

/// Test an agent error exits non-zero with its message
#[test]
fn test_agent_error_is_reported() {
    let mut server = mockito::Server::new();
    server
        .mock("PUT", "/benchmarks/cpu-burn/intensity")
        .with_status(400)
        .with_body(r#"{"error":true,"data":"Benchmark cpu-burn has not been deployed (state DEPLOYING)"}"#)
        .create();

    let home = TempDir::new().unwrap();
    let output = benchctl(
        &home,
        &["--agent-url", &server.url(), "intensity", "cpu-burn", "40"],
    );

    assert!(!output.status.success(), "Agent error should fail the command");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not been deployed"), "Should show agent message");
}

/// Test wait stops on a failed deployment
#[test]
fn test_wait_reports_failed_deployment() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/benchmarks/broken")
        .with_status(202)
        .with_body(r#"{"error":false,"data":"Deployment of benchmark broken failed: pull image failed"}"#)
        .create();

    let home = TempDir::new().unwrap();
    let output = benchctl(
        &home,
        &["--agent-url", &server.url(), "wait", "broken", "--timeout", "5"],
    );

    assert!(!output.status.success(), "Failed deployment should fail wait");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pull image failed"), "Should show failure reason");
}
