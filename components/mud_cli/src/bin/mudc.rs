//! Compile-only binary: source file in, bytecode file out.

use clap::Parser as ClapParser;
use mud_cli::{EXIT_ERROR, EXIT_NO_INPUT, EXIT_OK, EXIT_USAGE};

/// The `mudc` command line.
#[derive(Debug, ClapParser)]
#[command(name = "mudc", about = "Compile a Mudscript source file to bytecode")]
struct Cli {
    /// The source file to compile
    source: String,

    /// Output bytecode file
    #[arg(short = 'o', long = "output", default_value = "out.mdc")]
    output: String,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if e.use_stderr() {
                eprint!("{}", e);
                std::process::exit(EXIT_USAGE);
            }
            print!("{}", e);
            std::process::exit(EXIT_OK);
        }
    };
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {}", cli.source, e);
            return EXIT_NO_INPUT;
        }
    };
    let program = match parser::compile(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}: {}", cli.source, e);
            return EXIT_ERROR;
        }
    };
    let bytes = match program.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}: {}", cli.source, e);
            return EXIT_ERROR;
        }
    };
    if let Err(e) = std::fs::write(&cli.output, bytes) {
        eprintln!("{}: {}", cli.output, e);
        return EXIT_ERROR;
    }
    EXIT_OK
}
