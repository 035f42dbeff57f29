//! Process execution for stepexec
//!
//! Runs an external command, optionally as another system user, and returns
//! its captured output or a typed failure.
//!
//! # Identity Switching
//!
//! When a target user is requested the user is resolved before anything is
//! spawned. The privilege drop itself happens in the forked child, after
//! `fork` and before `exec`, so no code from the target program ever runs
//! with the caller's identity. Switching to a different user requires the
//! caller to run as root.
//!
//! # Environment
//!
//! The child's environment is built in three layers, later layers winning:
//!
//! 1. the caller's inherited environment
//! 2. `HOME`, `USER` and `LOGNAME` of the target user (when switching)
//! 3. explicit `env_vars` from the [`CommandSpec`]
//!
//! # Timeout Behavior
//!
//! Both output pipes are drained by reader threads while the runner waits.
//! When a command exceeds its timeout:
//! - `SIGTERM` is sent to the child's process group
//! - after the grace period, `SIGKILL` is sent to whatever is left
//! - the child is reaped and [`ExecError::Timeout`] carries the partial output
//!
//! Output still being written by processes the child left behind counts
//! against the same timeout. Without a timeout the runner waits for both
//! pipes to close. Each stream keeps at most `max_output_size` bytes.

mod capture;
mod command;
mod env;
mod error;
mod identity;
mod output;
mod runner;
mod terminate;


pub use command::{CommandLine, CommandSpec};
pub use error::{ErrorKind, ExecError};
pub use identity::Identity;
pub use output::{ExecutionResult, Output};
pub use runner::{execute, Runner};
pub use terminate::is_process_alive;
