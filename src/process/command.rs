//! Command specification types

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// The command to run: either an argument vector or a single command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Argument tokens. The first token is the program.
    Args(Vec<String>),
    /// A single string, meant for shell interpretation.
    Line(String),
}

impl CommandLine {
    /// Tokens as given, before any shell wrapping
    pub fn tokens(&self) -> Vec<String> {
        match self {
            CommandLine::Args(args) => args.clone(),
            CommandLine::Line(line) => vec![line.clone()],
        }
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        CommandLine::Line(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        CommandLine::Line(line)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(args: Vec<String>) -> Self {
        CommandLine::Args(args)
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(args: [&str; N]) -> Self {
        CommandLine::Args(args.iter().map(|a| a.to_string()).collect())
    }
}

/// Everything the runner needs to know to execute one command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: CommandLine,
    /// Interpret the command through the configured shell
    pub shell: bool,
    /// System user to run as
    pub user: Option<String>,
    /// Variables layered over the inherited environment. These win over
    /// everything else, including the target user's HOME/USER/LOGNAME.
    pub env_vars: BTreeMap<String, String>,
    /// Maximum wall-clock time; `None` waits forever
    pub timeout: Option<Duration>,
    /// Treat a non-zero exit code as a failure
    pub check: bool,
    /// Decode captured output as (lossy) UTF-8 instead of keeping raw bytes
    pub text: bool,
    /// Log the resolved command line at info level before running it
    pub debug: bool,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Run an argument vector directly, without a shell
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_command(CommandLine::Args(
            args.into_iter().map(Into::into).collect(),
        ))
    }

    /// Run a command line through the shell
    pub fn shell(line: impl Into<String>) -> Self {
        let mut spec = Self::from_command(CommandLine::Line(line.into()));
        spec.shell = true;
        spec
    }

    pub fn from_command(command: impl Into<CommandLine>) -> Self {
        Self {
            command: command.into(),
            shell: false,
            user: None,
            env_vars: BTreeMap::new(),
            timeout: None,
            check: true,
            text: true,
            debug: false,
            cwd: None,
        }
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn text(mut self, text: bool) -> Self {
        self.text = text;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}
