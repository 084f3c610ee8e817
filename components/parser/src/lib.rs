//! Lexer, parser and bytecode generator for Mudscript.
//!
//! The canonical interface of the language is the bytecode: [`compile`]
//! turns source text into a [`bytecode_system::Program`] ready for the
//! virtual machine.

pub mod ast;
pub mod bytecode_gen;
pub mod lexer;
pub mod parser;

pub use bytecode_gen::compile;
pub use lexer::{Keyword, Lexer, Punctuator, Token};
pub use parser::Parser;
