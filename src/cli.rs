//! Command-line interface

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;

use crate::config::{parse_duration, RunnerConfig};
use crate::process::{
    CommandLine, CommandSpec, ExecError, ExecutionResult, Identity, Output, Runner,
};

/// Exit status when the command timed out
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit status when the target user could not be assumed
pub const EXIT_IDENTITY: i32 = 125;
/// Exit status when the command could not be started
pub const EXIT_SPAWN: i32 = 127;

#[derive(Debug, Parser)]
#[command(name = "stepexec")]
#[command(about = "Run step-ca CLI commands as another user, with timeouts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Runner configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STEPEXEC_LOG` or `warn` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a command and report its result
    Run(RunArgs),

    /// Resolve a system user the way `run --user` would
    Identity {
        /// User name to resolve
        user: String,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run as this system user (requires root unless it is the current user)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Kill the command after this long (e.g. 30s, 500ms, 5m)
    #[arg(short, long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Interpret the command through the shell
    #[arg(long)]
    pub shell: bool,

    /// Extra environment variable, overriding inherited and user values
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Do not treat a non-zero exit code as a failure
    #[arg(long)]
    pub no_check: bool,

    /// Keep output as raw bytes instead of decoding it as text
    #[arg(long)]
    pub binary: bool,

    /// Log the resolved command line before running it
    #[arg(long)]
    pub debug: bool,

    /// Working directory for the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Print the result as JSON instead of passing output through
    #[arg(long)]
    pub json: bool,

    /// The command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Cli {
    /// Log level to install, raised to `info` when `run --debug` needs the
    /// command line to be visible
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        match (&self.command, self.log_level) {
            (Commands::Run(args), None) if args.debug => Some(LogLevel::Info),
            (_, level) => level,
        }
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing variable name in '{s}'")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

impl RunArgs {
    pub fn to_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::from_command(CommandLine::Args(self.command.clone()))
            .with_shell(self.shell)
            .envs(self.env.iter().cloned())
            .check(!self.no_check)
            .text(!self.binary)
            .debug(self.debug);

        if let Some(user) = &self.user {
            spec = spec.user(user.clone());
        }
        if let Some(timeout) = self.timeout {
            spec = spec.timeout(timeout);
        }
        if let Some(cwd) = &self.cwd {
            spec = spec.cwd(cwd.clone());
        }
        spec
    }
}

/// JSON shape printed by `run --json`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub args: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: Output,
    pub stderr: Output,
    pub duration_ms: Option<u64>,
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

impl RunReport {
    fn from_outcome(command: &[String], outcome: &Result<ExecutionResult, ExecError>) -> Self {
        match outcome {
            Ok(result) => Self {
                args: result.args.clone(),
                exit_code: Some(result.exit_code),
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
                duration_ms: Some(result.duration.as_millis() as u64),
                error: None,
            },
            Err(err) => {
                let (args, duration_ms) = match err {
                    ExecError::Timeout { args, elapsed, .. } => {
                        (args.clone(), Some(elapsed.as_millis() as u64))
                    }
                    ExecError::NonZeroExit { args, .. } => (args.clone(), None),
                    _ => (command.to_vec(), None),
                };
                Self {
                    args,
                    exit_code: err.exit_code(),
                    stdout: err.stdout().cloned().unwrap_or_default(),
                    stderr: err.stderr().cloned().unwrap_or_default(),
                    duration_ms,
                    error: Some(ErrorReport {
                        kind: err.kind().as_str(),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }
}

/// Process exit status the CLI reports for an execution outcome
pub fn exit_status(outcome: &Result<ExecutionResult, ExecError>) -> i32 {
    match outcome {
        Ok(result) => child_status(result.exit_code),
        Err(ExecError::NonZeroExit { code, .. }) => child_status(*code),
        Err(ExecError::Timeout { .. }) => EXIT_TIMEOUT,
        Err(ExecError::IdentitySwitchFailed { .. }) => EXIT_IDENTITY,
        Err(ExecError::SpawnFailed { .. }) => EXIT_SPAWN,
        Err(ExecError::WaitFailed { .. }) => 1,
    }
}

/// Map a child exit code into the 0-255 range, shell style
fn child_status(code: i32) -> i32 {
    if code < 0 {
        128 + (-code).min(127)
    } else {
        code.min(255)
    }
}

/// Run the parsed CLI, returning the process exit status
pub fn run(cli: Cli) -> Result<i32> {
    let config = RunnerConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_command(&Runner::new(config), &args),
        Commands::Identity { user } => show_identity(&user),
    }
}

fn run_command(runner: &Runner, args: &RunArgs) -> Result<i32> {
    let outcome = runner.execute(args.to_spec());
    let status = exit_status(&outcome);

    if args.json {
        let report = RunReport::from_outcome(&args.command, &outcome);
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize result")?;
        println!("{json}");
        return Ok(status);
    }

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    match &outcome {
        Ok(result) => {
            stdout.write_all(result.stdout.as_bytes())?;
            stderr.write_all(result.stderr.as_bytes())?;
        }
        Err(err) => {
            if let Some(out) = err.stdout() {
                stdout.write_all(out.as_bytes())?;
            }
            if let Some(out) = err.stderr() {
                stderr.write_all(out.as_bytes())?;
            }
            writeln!(stderr, "{} {}", "error:".red().bold(), headline(err))?;
        }
    }
    stdout.flush()?;

    Ok(status)
}

/// First line of the error, since captured output was already passed through
fn headline(err: &ExecError) -> String {
    err.to_string().lines().next().unwrap_or_default().to_string()
}

fn show_identity(user: &str) -> Result<i32> {
    let identity = match Identity::resolve(user) {
        Ok(identity) => identity,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return Ok(EXIT_IDENTITY);
        }
    };

    let groups = identity
        .groups
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!("user={}", identity.name);
    println!("uid={}", identity.uid);
    println!("gid={}", identity.gid);
    println!("groups={groups}");
    println!("home={}", identity.home.display());
    Ok(0)
}
