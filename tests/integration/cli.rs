//! End-to-end tests for the `stepexec` binary

use std::fs;

use serde_json::Value;
use tempfile::TempDir;

use super::helpers::stepexec_bin;

#[test]
fn test_run_passes_output_through() {
    let output = stepexec_bin()
        .args(["run", "--", "echo", "hello"])
        .output()
        .expect("Failed to run stepexec");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
}

#[test]
fn test_run_exit_code_is_forwarded() {
    let output = stepexec_bin()
        .args(["run", "--", "sh", "-c", "echo oops >&2; exit 3"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("oops"));
    assert!(stderr.contains("return code 3"));
}

#[test]
fn test_run_no_check_forwards_code_without_error() {
    let output = stepexec_bin()
        .args(["run", "--no-check", "--shell", "--", "exit 4"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(!String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn test_run_timeout_exit_status() {
    let output = stepexec_bin()
        .args(["run", "--timeout", "300ms", "--", "sleep", "5"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn test_run_unknown_user_exit_status() {
    let output = stepexec_bin()
        .args(["run", "--user", "no-such-step-user", "--", "true"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(125));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no-such-step-user"));
}

#[test]
fn test_run_missing_program_exit_status() {
    let output = stepexec_bin()
        .args(["run", "--", "stepexec-not-a-real-program"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn test_run_json_success() {
    let output = stepexec_bin()
        .args(["run", "--json", "--shell", "--env", "CUSTOM=x", "--", "echo $CUSTOM"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["exit_code"], 0);
    assert_eq!(report["stdout"], "x\n");
    assert!(report["error"].is_null());
}

#[test]
fn test_run_json_failure_kind() {
    let output = stepexec_bin()
        .args(["run", "--json", "--", "false"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["exit_code"], 1);
    assert_eq!(report["error"]["kind"], "non_zero_exit");
}

#[test]
fn test_run_debug_logs_command_line() {
    let output = stepexec_bin()
        .args(["run", "--debug", "--", "echo", "two words"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Executing command"));
    assert!(stderr.contains("'two words'"));
}

#[test]
fn test_config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("stepexec.toml");
    fs::write(&config, "default_timeout = \"200ms\"\n").unwrap();

    let output = stepexec_bin()
        .args(["--config", config.to_str().unwrap(), "run", "--", "sleep", "5"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("stepexec.toml");
    fs::write(&config, "termination_grace = \"later\"\n").unwrap();

    let output = stepexec_bin()
        .args(["--config", config.to_str().unwrap(), "run", "--", "true"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to parse config file"));
}

#[test]
fn test_identity_subcommand_for_root() {
    let output = stepexec_bin().args(["identity", "root"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("user=root"));
    assert!(stdout.contains("uid=0"));
}
