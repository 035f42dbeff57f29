//! Low-level command execution

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use std::{env, io};

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::RunnerConfig;

use super::capture::StreamCapture;
use super::command::CommandSpec;
use super::env::compose_env;
use super::error::ExecError;
use super::identity::{is_drop_failure, Identity, PrivilegeDrop};
use super::output::{ExecutionResult, Output};
use super::terminate::terminate;

/// Run `spec` with the default [`RunnerConfig`]
pub fn execute(spec: CommandSpec) -> Result<ExecutionResult, ExecError> {
    Runner::default().execute(spec)
}

/// Executes commands according to a fixed [`RunnerConfig`].
///
/// Holds no per-execution state; one runner may be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

/// Program and arguments after shell wrapping and `PATH` lookup
#[derive(Debug)]
struct ResolvedCommand {
    /// Program name as given, passed to the child as `argv[0]`
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ResolvedCommand {
    fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }

    fn display(&self) -> String {
        self.argv()
            .into_iter()
            .map(|arg| shell_escape::escape(arg.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a command to completion, or until its timeout expires.
    ///
    /// Blocks the calling thread. The user switch, if any, is validated
    /// before anything is spawned.
    pub fn execute(&self, spec: CommandSpec) -> Result<ExecutionResult, ExecError> {
        let identity = spec.user.as_deref().map(Identity::resolve).transpose()?;
        let privilege_drop = identity
            .as_ref()
            .map(PrivilegeDrop::for_identity)
            .transpose()?
            .flatten();

        let child_env = compose_env(env::vars_os(), identity.as_ref(), &spec.env_vars);
        let resolved = self.resolve(&spec, &child_env)?;
        let argv = resolved.argv();

        if spec.debug {
            info!(user = ?spec.user, "Executing command: {}", resolved.display());
        } else {
            debug!(user = ?spec.user, "Executing command: {}", resolved.display());
        }

        let mut cmd = Command::new(&resolved.program);
        cmd.arg0(&resolved.name)
            .args(&resolved.args)
            .env_clear()
            .envs(&child_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        if self.config.process_group {
            cmd.process_group(0);
        }
        let switching = privilege_drop.is_some();
        if let Some(privileges) = privilege_drop {
            privileges.install(&mut cmd);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            match spec.user.as_deref() {
                Some(user) if switching && is_drop_failure(&source) => ExecError::identity(
                    user,
                    format!("dropping privileges in the child failed: {source}"),
                ),
                _ => ExecError::SpawnFailed {
                    program: argv[0].clone(),
                    source,
                },
            }
        })?;

        // Start draining before waiting. A child blocked on a full pipe
        // (~64KB on Linux) would otherwise never exit.
        let max_output = self.config.max_output_size;
        let mut stdout = StreamCapture::spawn("stdout", child.stdout.take(), max_output);
        let mut stderr = StreamCapture::spawn("stderr", child.stderr.take(), max_output);

        // A timeout too large to represent is treated as none
        let timeout = spec
            .timeout
            .or(self.config.default_timeout)
            .filter(|limit| start.checked_add(*limit).is_some());
        let waited = match timeout {
            Some(limit) => child.wait_timeout(limit),
            None => child.wait().map(Some),
        };

        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    pid = child.id(),
                    timeout_ms = timeout.map(|t| t.as_millis() as u64),
                    "command timed out; terminating"
                );
                return Err(self.timed_out(&mut child, argv, start, stdout, stderr, spec.text));
            }
            Err(source) => {
                self.terminate(&mut child);
                return Err(ExecError::WaitFailed {
                    program: argv[0].clone(),
                    source,
                });
            }
        };

        // Processes the child left running may still hold a pipe; their
        // output counts against the same timeout.
        let deadline = timeout.and_then(|limit| start.checked_add(limit));
        if !wait_for_eof(deadline, &mut stdout, &mut stderr) {
            warn!(
                pid = child.id(),
                "command exited but its output pipes stayed open past the timeout; terminating"
            );
            return Err(self.timed_out(&mut child, argv, start, stdout, stderr, spec.text));
        }

        let duration = start.elapsed();
        let stdout = Output::from_bytes(stdout.finish(Duration::ZERO), spec.text);
        let stderr = Output::from_bytes(stderr.finish(Duration::ZERO), spec.text);
        let exit_code = exit_code(status);

        debug!(
            pid = child.id(),
            exit_code,
            duration_ms = duration.as_millis() as u64,
            "command exited"
        );

        if spec.check && exit_code != 0 {
            return Err(ExecError::NonZeroExit {
                args: argv,
                code: exit_code,
                stdout,
                stderr,
            });
        }

        Ok(ExecutionResult {
            args: argv,
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }

    /// Kill a command that ran out of time and collect what it wrote
    fn timed_out(
        &self,
        child: &mut Child,
        args: Vec<String>,
        start: Instant,
        stdout: StreamCapture,
        stderr: StreamCapture,
        text: bool,
    ) -> ExecError {
        self.terminate(child);
        let elapsed = start.elapsed();
        let collect = self.config.output_collection_timeout;
        ExecError::Timeout {
            args,
            elapsed,
            stdout: Output::from_bytes(stdout.finish(collect), text),
            stderr: Output::from_bytes(stderr.finish(collect), text),
        }
    }

    fn terminate(&self, child: &mut Child) {
        terminate(
            child,
            self.config.termination_grace,
            self.config.process_group,
        );
    }

    /// Apply shell wrapping and find the program on the child's `PATH`
    fn resolve(
        &self,
        spec: &CommandSpec,
        child_env: &BTreeMap<OsString, OsString>,
    ) -> Result<ResolvedCommand, ExecError> {
        let given = spec.command.tokens();

        // Extra tokens after a shell line become the shell's positional
        // parameters, starting at $0. An empty shell line is valid.
        let mut tokens = if spec.shell {
            let mut tokens = vec![
                self.config.shell.to_string_lossy().into_owned(),
                "-c".into(),
            ];
            if given.is_empty() {
                tokens.push(String::new());
            }
            tokens.extend(given);
            tokens
        } else {
            given
        };

        if tokens.first().map_or(true, |first| first.is_empty()) {
            return Err(ExecError::SpawnFailed {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        }

        let name = tokens.remove(0);
        let program = find_program(&name, child_env, spec.cwd.as_deref())?;

        Ok(ResolvedCommand {
            name,
            program,
            args: tokens,
        })
    }
}

/// Wait for both pipes to close, up to `deadline` when one is given
fn wait_for_eof(
    deadline: Option<Instant>,
    stdout: &mut StreamCapture,
    stderr: &mut StreamCapture,
) -> bool {
    [stdout, stderr].into_iter().all(|capture| {
        let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        capture.wait(remaining)
    })
}

fn find_program(
    name: &str,
    child_env: &BTreeMap<OsString, OsString>,
    cwd: Option<&Path>,
) -> Result<PathBuf, ExecError> {
    let spawn_failed = |source: io::Error| ExecError::SpawnFailed {
        program: name.to_string(),
        source,
    };

    let cwd = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir().map_err(spawn_failed)?,
    };
    let path = child_env.get(OsStr::new("PATH"));

    which::which_in(name, path, &cwd).map_err(|e| {
        spawn_failed(io::Error::new(
            io::ErrorKind::NotFound,
            format!("executable not found: {e}"),
        ))
    })
}

/// Exit code, or the negated signal number for a child killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}
