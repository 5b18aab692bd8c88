//! CLI error handling

use std::fmt;

use pgb_errors::UserFacingError;

/// Exit status for an interrupted run
pub const EXIT_CANCELLED: i32 = 130;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Error reported by the library crates
    Pgb(pgb_errors::Error),
    /// The run exceeded `--timeout`
    TimedOut(u64),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pgb(e) if e.is_cancelled() => EXIT_CANCELLED,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Pgb(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this step.")?;
                }
                Ok(())
            }
            CliError::TimedOut(secs) => write!(f, "Build step timed out after {secs}s"),
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Pgb(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<pgb_errors::Error> for CliError {
    fn from(e: pgb_errors::Error) -> Self {
        CliError::Pgb(e)
    }
}

impl From<pgb_errors::ConfigError> for CliError {
    fn from(e: pgb_errors::ConfigError) -> Self {
        CliError::Pgb(e.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
