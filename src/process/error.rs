//! Failure modes of a command execution

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::output::Output;

/// Why an execution did not produce an [`ExecutionResult`](super::ExecutionResult)
#[derive(Debug, Error)]
pub enum ExecError {
    /// The user could not be resolved or assumed. Nothing was run.
    #[error("unable to switch to user '{user}': {reason}")]
    IdentitySwitchFailed { user: String, reason: String },

    #[error("failed to start '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The child ran past its deadline and has been killed and reaped.
    #[error("command '{}' timed out after {}ms", .args.join(" "), .elapsed.as_millis())]
    Timeout {
        args: Vec<String>,
        elapsed: Duration,
        stdout: Output,
        stderr: Output,
    },

    #[error(
        "command failed with return code {code}.\nSTDOUT: {}\nSTDERR: {}",
        .stdout.to_text().trim(),
        .stderr.to_text().trim()
    )]
    NonZeroExit {
        args: Vec<String>,
        code: i32,
        stdout: Output,
        stderr: Output,
    },

    #[error("failed to wait for '{program}': {source}")]
    WaitFailed {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Category of an [`ExecError`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IdentitySwitchFailed,
    SpawnFailed,
    Timeout,
    NonZeroExit,
    WaitFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IdentitySwitchFailed => "identity_switch_failed",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NonZeroExit => "non_zero_exit",
            ErrorKind::WaitFailed => "wait_failed",
        }
    }
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::IdentitySwitchFailed { .. } => ErrorKind::IdentitySwitchFailed,
            ExecError::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            ExecError::Timeout { .. } => ErrorKind::Timeout,
            ExecError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ExecError::WaitFailed { .. } => ErrorKind::WaitFailed,
        }
    }

    pub(crate) fn identity(user: &str, reason: impl Into<String>) -> Self {
        ExecError::IdentitySwitchFailed {
            user: user.to_string(),
            reason: reason.into(),
        }
    }

    /// Exit code of the child, when it got far enough to have one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Captured stdout, complete for `NonZeroExit`, partial for `Timeout`
    pub fn stdout(&self) -> Option<&Output> {
        match self {
            ExecError::Timeout { stdout, .. } | ExecError::NonZeroExit { stdout, .. } => {
                Some(stdout)
            }
            _ => None,
        }
    }

    pub fn stderr(&self) -> Option<&Output> {
        match self {
            ExecError::Timeout { stderr, .. } | ExecError::NonZeroExit { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}
