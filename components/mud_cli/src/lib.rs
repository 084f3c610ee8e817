//! Mudscript command-line interface.
//!
//! Provides the `mudscript` runner/REPL and the building blocks used by
//! the `mudc` compile-only binary.

pub mod error;
pub mod repl;
pub mod runtime;

use clap::Parser as ClapParser;

pub use error::{CliError, CliResult, EXIT_ERROR, EXIT_NO_INPUT, EXIT_OK, EXIT_USAGE};
pub use repl::run_repl;
pub use runtime::Runtime;

/// The `mudscript` command line.
#[derive(Debug, ClapParser)]
#[command(name = "mudscript", about = "Run Mudscript source or bytecode files")]
pub struct Cli {
    /// Script files to run in order; with none, start the REPL
    pub files: Vec<String>,

    /// Print disassembly before execution
    #[arg(short = 'd', long = "disasm")]
    pub disasm: bool,

    /// Print a per-opcode execution trace
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
