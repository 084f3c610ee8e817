//! Bytecode system: the opcode set, constant table, program container,
//! the versioned bytecode file format, and the disassembler.

pub mod const_table;
pub mod disasm;
pub mod opcode;
pub mod program;

pub use const_table::ConstTable;
pub use disasm::{disassemble_chunk, disassemble_program};
pub use opcode::{OpCode, OperandLayout};
pub use program::{DebugMap, Program, BINARY_MARKER, FORMAT_VERSION, MAGIC};
