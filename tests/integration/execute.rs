//! Public API behaviour with real processes

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::TempDir;

use stepexec::config::RunnerConfig;
use stepexec::process::{execute, CommandSpec, ErrorKind, ExecError, Runner};

use super::helpers::{read_pid, wait_until_gone};

#[test]
fn test_timeout_kills_shell_and_its_children() {
    let dir = TempDir::new().unwrap();
    let shell_pid = dir.path().join("shell.pid");
    let child_pid = dir.path().join("child.pid");

    let script = format!(
        "echo $$ > {}; sleep 30 & echo $! > {}; echo ready; wait",
        shell_pid.display(),
        child_pid.display()
    );
    let err =
        execute(CommandSpec::shell(script).timeout(Duration::from_millis(700))).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.stdout().unwrap(), "ready\n");

    let shell = read_pid(&shell_pid);
    let sleeper = read_pid(&child_pid);
    assert!(wait_until_gone(shell, Duration::from_secs(2)), "shell {shell} survived");
    assert!(
        wait_until_gone(sleeper, Duration::from_secs(2)),
        "background child {sleeper} survived"
    );
}

#[test]
fn test_output_of_background_writer_is_collected() {
    // Far shorter than the writer; collecting must not give up early
    let runner = Runner::new(RunnerConfig {
        output_collection_timeout: Duration::from_millis(200),
        ..RunnerConfig::default()
    });

    let result = runner
        .execute(CommandSpec::shell("(sleep 1; echo late) & echo early"))
        .unwrap();

    assert_eq!(result.stdout, "early\nlate\n");
    assert!(result.duration >= Duration::from_secs(1));
}

#[test]
fn test_background_writer_holding_pipe_times_out() {
    let dir = TempDir::new().unwrap();
    let writer_pid = dir.path().join("writer.pid");

    let runner = Runner::new(RunnerConfig {
        output_collection_timeout: Duration::from_millis(200),
        ..RunnerConfig::default()
    });
    let script = format!(
        "(sleep 30; echo late) & echo $! > {}; echo early",
        writer_pid.display()
    );

    let start = Instant::now();
    let err = runner
        .execute(CommandSpec::shell(script).timeout(Duration::from_millis(700)))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.stdout().unwrap(), "early\n");
    assert!(start.elapsed() < Duration::from_secs(10));

    let writer = read_pid(&writer_pid);
    assert!(
        wait_until_gone(writer, Duration::from_secs(2)),
        "background writer {writer} survived"
    );
}

#[test]
fn test_timeout_escalates_to_sigkill() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("stubborn.pid");

    let runner = Runner::new(RunnerConfig {
        termination_grace: Duration::from_millis(300),
        ..RunnerConfig::default()
    });
    let script = format!(
        "trap '' TERM; echo $$ > {}; while :; do sleep 1; done",
        pid_file.display()
    );

    let start = Instant::now();
    let err = runner
        .execute(CommandSpec::shell(script).timeout(Duration::from_millis(500)))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
    let pid = read_pid(&pid_file);
    assert!(wait_until_gone(pid, Duration::from_secs(2)));
}

#[test]
fn test_continuous_output_over_several_seconds() {
    // ~512KB spread over about two seconds, far past the pipe buffer
    let script =
        "i=0; while [ $i -lt 8 ]; do head -c 65536 /dev/zero; sleep 0.25; i=$((i+1)); done";
    let result = execute(
        CommandSpec::shell(script)
            .text(false)
            .timeout(Duration::from_secs(30)),
    )
    .unwrap();

    assert_eq!(result.stdout.len(), 8 * 65536);
    assert_eq!(result.exit_code, 0);
}

#[test]
fn test_unknown_user_creates_no_file() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("should-not-exist");

    let err = execute(
        CommandSpec::shell(format!("touch {}", marker.display())).user("no-such-step-user"),
    )
    .unwrap_err();

    match &err {
        ExecError::IdentitySwitchFailed { user, .. } => assert_eq!(user, "no-such-step-user"),
        other => panic!("expected IdentitySwitchFailed, got {other:?}"),
    }
    assert!(!marker.exists());
}

#[test]
fn test_concurrent_invocations_are_independent() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                execute(
                    CommandSpec::shell("sleep 0.2; echo $N")
                        .env("N", i.to_string())
                        .timeout(Duration::from_secs(10)),
                )
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.stdout_text(), i.to_string());
    }
}

#[test]
#[serial]
fn test_inherited_environment_reaches_child() {
    env::set_var("STEPEXEC_TEST_INHERITED", "from-parent");

    let result = execute(CommandSpec::shell("echo $STEPEXEC_TEST_INHERITED")).unwrap();
    let overridden = execute(
        CommandSpec::shell("echo $STEPEXEC_TEST_INHERITED")
            .env("STEPEXEC_TEST_INHERITED", "explicit"),
    )
    .unwrap();

    env::remove_var("STEPEXEC_TEST_INHERITED");

    assert_eq!(result.stdout, "from-parent\n");
    assert_eq!(overridden.stdout, "explicit\n");
}

#[test]
fn test_no_timeout_waits_for_completion() {
    let result = execute(CommandSpec::shell("sleep 1; echo finished")).unwrap();
    assert_eq!(result.stdout, "finished\n");
    assert!(result.duration >= Duration::from_secs(1));
}
