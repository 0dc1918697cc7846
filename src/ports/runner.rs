use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use tokio_util::sync::CancellationToken;

/// Exit code reported when a stage was killed instead of exiting on its own.
pub const CANCELLED_EXIT_CODE: i32 = -1;

/// A program and its argument vector, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl StageCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Value following `flag`, if the flag is present.
    pub fn flag_value(&self, flag: &str) -> Option<&OsString> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
    }
}

impl std::fmt::Display for StageCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs one stage to completion and reports its exit code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Returns the process exit code, or [`CANCELLED_EXIT_CODE`] when `cancel`
    /// fired or the process was killed by a signal. `Err` only when the
    /// process could not be started or waited on.
    async fn run(&self, command: &StageCommand, cancel: &CancellationToken) -> io::Result<i32>;
}
