//! Error types for the CLI, mapped onto process exit codes.

use core_types::MudError;

/// Exit code for successful runs.
pub const EXIT_OK: i32 = 0;
/// Exit code for compile and runtime errors.
pub const EXIT_ERROR: i32 = 1;
/// Exit code for command-line usage errors.
pub const EXIT_USAGE: i32 = 64;
/// Exit code for unreadable input files.
pub const EXIT_NO_INPUT: i32 = 66;

/// CLI-level errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Compilation or execution failed
    #[error("{0}")]
    Mud(#[from] MudError),

    /// REPL machinery failed
    #[error("repl error: {0}")]
    Repl(String),
}

impl CliError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Mud(MudError::Io(_)) => EXIT_NO_INPUT,
            CliError::Mud(_) => EXIT_ERROR,
            CliError::Repl(_) => EXIT_ERROR,
        }
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
