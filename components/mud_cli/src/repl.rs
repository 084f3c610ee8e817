//! The interactive REPL.
//!
//! Line-buffered: a trailing `\` continues input onto another line;
//! `#exit` or an empty line terminates the session.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use core_types::Value;

use crate::error::{CliError, CliResult};
use crate::runtime::Runtime;

/// Runs the REPL until the user exits.
pub fn run_repl(runtime: &mut Runtime) -> CliResult<()> {
    let mut editor = DefaultEditor::new()
        .map_err(|e| CliError::Repl(format!("failed to initialize editor: {}", e)))?;

    println!("Mudscript interpreter");
    println!("Type #exit or an empty line to quit; end a line with \\ to continue.");

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "mud> " } else { "...> " };
        match editor.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed == "#exit" {
                        break;
                    }
                }
                if let Some(continued) = line.strip_suffix('\\') {
                    buffer.push_str(continued);
                    buffer.push('\n');
                    continue;
                }
                buffer.push_str(&line);

                let source = std::mem::take(&mut buffer);
                let _ = editor.add_history_entry(&source);
                match runtime.execute_source(&source) {
                    Ok(Value::Undefined) => {}
                    Ok(value) => println!("{}", value),
                    Err(e) => eprintln!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                return Err(CliError::Repl(format!("readline error: {}", e)));
            }
        }
    }
    Ok(())
}
