//! Mudscript runner: execute files sequentially, or start the REPL.

use clap::Parser as ClapParser;
use mud_cli::{run_repl, Cli, Runtime, EXIT_OK, EXIT_USAGE};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not usage errors
            if e.use_stderr() {
                eprint!("{}", e);
                std::process::exit(EXIT_USAGE);
            }
            print!("{}", e);
            std::process::exit(EXIT_OK);
        }
    };
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut runtime = Runtime::new(cli.disasm, cli.verbose);

    if cli.files.is_empty() {
        return match run_repl(&mut runtime) {
            Ok(()) => EXIT_OK,
            Err(e) => {
                eprintln!("{}", e);
                e.exit_code()
            }
        };
    }

    for file in &cli.files {
        if let Err(e) = runtime.execute_file(file) {
            eprintln!("{}: {}", file, e);
            return e.exit_code();
        }
    }
    EXIT_OK
}
