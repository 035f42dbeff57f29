//! Result types for command execution

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Captured content of one output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Text(String),
    Bytes(Vec<u8>),
}

impl Output {
    /// Build from raw captured bytes. With `text` set, invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn from_bytes(bytes: Vec<u8>, text: bool) -> Self {
        if text {
            match String::from_utf8(bytes) {
                Ok(s) => Output::Text(s),
                Err(e) => Output::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            }
        } else {
            Output::Bytes(bytes)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Output::Text(s) => s.as_bytes(),
            Output::Bytes(b) => b,
        }
    }

    /// Text view of the output, lossy for raw bytes
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Output::Text(s) => Cow::Borrowed(s),
            Output::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::Text(String::new())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl PartialEq<str> for Output {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Output {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

/// Outcome of a command that ran to completion
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Argument vector actually executed, with the program resolved
    pub args: Vec<String>,
    pub exit_code: i32,
    pub stdout: Output,
    pub stderr: Output,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout, the form most CLI output gets parsed in
    pub fn stdout_text(&self) -> String {
        self.stdout.to_text().trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.to_text().trim().to_string()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let status = if self.success() { "OK" } else { "FAILED" };
        format!(
            "{} - {} ({}ms, exit code: {})",
            status,
            self.args.join(" "),
            self.duration.as_millis(),
            self.exit_code
        )
    }
}
