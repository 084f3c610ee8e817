//! Error types for compilation and execution.
//!
//! Compile errors carry a source position and are never recoverable
//! in-script. Runtime errors carry the thrown value and a script-level
//! traceback, and are catchable by `try`/`catch`.

use std::fmt;

use crate::value::Value;

/// A compilation failure with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// 1-based source line
    pub line: u32,
    /// 1-based source column
    pub column: u32,
    /// What went wrong
    pub message: String,
}

impl CompileError {
    /// Creates a compile error.
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> CompileError {
        CompileError {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compile error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// One traceback frame: the source line number and its text.
#[derive(Debug, Clone, PartialEq)]
pub struct TracebackEntry {
    /// 1-based source line number
    pub line: u32,
    /// The source line's text, when the debug map is available
    pub source: String,
}

/// A script-level runtime exception.
///
/// The thrown value is any script value; when the VM itself raises, the
/// thrown value defaults to the message as a string. The traceback lists
/// frames innermost first.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// Human-readable message
    pub message: String,
    /// The thrown script value
    pub thrown: Value,
    /// Script frames, innermost first
    pub traceback: Vec<TracebackEntry>,
}

impl RuntimeError {
    /// Creates a runtime error whose thrown value is the message string.
    pub fn new(message: impl Into<String>) -> RuntimeError {
        let message = message.into();
        let thrown = Value::string(message.clone());
        RuntimeError {
            message,
            thrown,
            traceback: Vec::new(),
        }
    }

    /// Creates a runtime error for an explicitly thrown value.
    pub fn with_thrown(message: impl Into<String>, thrown: Value) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            thrown,
            traceback: Vec::new(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !matches!(self.thrown, Value::Undefined) {
            let thrown = self.thrown.to_string();
            if thrown != self.message {
                write!(f, ": {}", thrown)?;
            }
        }
        for entry in &self.traceback {
            write!(f, "\n  at line {}: {}", entry.line, entry.source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Umbrella error used at the embedding facade.
#[derive(Debug)]
pub enum MudError {
    /// The source failed to compile
    Compile(CompileError),
    /// Execution raised an uncaught exception
    Runtime(RuntimeError),
    /// A source or bytecode file could not be read or decoded
    Io(std::io::Error),
}

impl fmt::Display for MudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MudError::Compile(e) => write!(f, "{}", e),
            MudError::Runtime(e) => write!(f, "{}", e),
            MudError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MudError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MudError::Compile(e) => Some(e),
            MudError::Runtime(e) => Some(e),
            MudError::Io(e) => Some(e),
        }
    }
}

impl From<CompileError> for MudError {
    fn from(err: CompileError) -> Self {
        MudError::Compile(err)
    }
}

impl From<RuntimeError> for MudError {
    fn from(err: RuntimeError) -> Self {
        MudError::Runtime(err)
    }
}

impl From<std::io::Error> for MudError {
    fn from(err: std::io::Error) -> Self {
        MudError::Io(err)
    }
}
