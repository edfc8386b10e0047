use crate::error::{ProcrunError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Permission bits for files created by output redirection.
pub const DEFAULT_REDIRECT_MODE: u32 = 0o644;

/// Program path followed by its arguments, passed verbatim to the OS.
///
/// There is no shell interpretation: each element becomes exactly one argv
/// entry. A descriptor always holds at least one element and no element
/// contains a NUL byte, so it can always be handed to the exec primitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandDescriptor {
    argv: Vec<String>,
}

impl CommandDescriptor {
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();

        if argv.is_empty() {
            return Err(ProcrunError::ContractViolation(
                "command descriptor needs at least a program path".to_string(),
            ));
        }
        if argv[0].is_empty() {
            return Err(ProcrunError::ContractViolation(
                "program path is empty".to_string(),
            ));
        }
        if let Some(pos) = argv.iter().position(|a| a.contains('\0')) {
            return Err(ProcrunError::ContractViolation(format!(
                "argv[{}] contains a NUL byte",
                pos
            )));
        }

        Ok(Self { argv })
    }

    /// Path of the executable (`argv[0]`).
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the program path.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn len(&self) -> usize {
        self.argv.len()
    }

    /// Always false: a descriptor holds at least the program path.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Same arguments, different program path.
    pub fn with_program<P: Into<String>>(&self, program: P) -> Result<Self> {
        let mut argv = self.argv.clone();
        argv[0] = program.into();
        Self::new(argv)
    }
}

impl TryFrom<Vec<String>> for CommandDescriptor {
    type Error = ProcrunError;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        Self::new(argv)
    }
}

impl From<CommandDescriptor> for Vec<String> {
    fn from(descriptor: CommandDescriptor) -> Self {
        descriptor.argv
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// File that receives a child's standard output.
///
/// Opened write-only, created if absent and truncated if present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectTarget {
    pub path: PathBuf,
    pub mode: u32,
}

impl RedirectTarget {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: DEFAULT_REDIRECT_MODE,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Normal exit with the given status code.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
    /// Stopped by the given signal number.
    Stopped(i32),
    /// Any other status the OS reported.
    Other,
}

impl ExitOutcome {
    /// Success means a normal exit with code exactly zero.
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with status {}", code),
            ExitOutcome::Signaled(sig) => write!(f, "killed by signal {}", sig),
            ExitOutcome::Stopped(sig) => write!(f, "stopped by signal {}", sig),
            ExitOutcome::Other => write!(f, "terminated abnormally"),
        }
    }
}

/// Which of the three execution modes produced a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Shell,
    Exec,
    Redirect,
}

/// Record of a single runner invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub command: Vec<String>,
    pub output: Option<PathBuf>,
    pub outcome: Option<ExitOutcome>,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(mode: RunMode, command: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            command,
            output: None,
            outcome: None,
            success: false,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn with_output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// Record the terminal outcome, if the child was reaped at all.
    pub fn finish(mut self, outcome: Option<ExitOutcome>) -> Self {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        self.duration_ms = elapsed.num_milliseconds().max(0) as u64;
        self.success = outcome.map(|o| o.success()).unwrap_or(false);
        self.outcome = outcome;
        self
    }
}
