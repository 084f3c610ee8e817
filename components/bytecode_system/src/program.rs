//! The program container and the bytecode file format.
//!
//! A program is the constant table, the main function, and an optional
//! debug map. The binary format is deliberately non-portable: multi-byte
//! fields use native byte order and lengths are native pointer width; the
//! loader rejects files produced on a machine with a different layout.

use std::rc::Rc;

use core_types::{Chunk, Function, FunctionKind, Value};

use crate::const_table::ConstTable;

/// Magic number identifying a bytecode file, written in native byte order.
pub const MAGIC: u32 = 0xB00B_A911;

/// First byte of every bytecode file.
pub const BINARY_MARKER: u8 = 0x01;

/// Current format version.
pub const FORMAT_VERSION: u8 = 0x01;

/// Value tags used by the constant-table serializer.
mod tag {
    pub const UNDEFINED: u8 = 0;
    pub const NULL: u8 = 1;
    pub const BOOLEAN: u8 = 2;
    pub const INTEGER: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const STRING: u8 = 5;
    pub const ARRAY: u8 = 6;
    pub const FUNCTION: u8 = 7;
}

/// Source-text debug information for stack traces.
#[derive(Debug, Clone, Default)]
pub struct DebugMap {
    /// The compiled source, split into lines
    pub source_lines: Vec<String>,
}

impl DebugMap {
    /// Builds a debug map from the compiled source text.
    pub fn from_source(source: &str) -> DebugMap {
        DebugMap {
            source_lines: source.lines().map(|l| l.to_string()).collect(),
        }
    }

    /// The text of a 1-based source line.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.source_lines.get(line as usize - 1).map(|s| s.as_str())
    }
}

/// A compiled program.
#[derive(Debug)]
pub struct Program {
    /// Constant pool shared by every function of the program
    pub constants: Rc<ConstTable>,
    /// The entry function (a script function with the ceremonial
    /// parameter list)
    pub main: Rc<Function>,
    /// Source text for tracebacks, absent for programs loaded from
    /// bytecode files
    pub debug: Option<DebugMap>,
}

impl Program {
    /// Serializes this program to the bytecode file format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        bytes.push(BINARY_MARKER);
        bytes.extend_from_slice(&MAGIC.to_ne_bytes());
        bytes.push(FORMAT_VERSION);
        bytes.push(std::mem::size_of::<usize>() as u8);
        // Reserved metadata block
        write_usize(&mut bytes, 0);

        write_usize(&mut bytes, self.constants.len());
        for value in self.constants.entries() {
            serialize_value(&mut bytes, value)?;
        }

        let main_chunk = script_chunk(&self.main)
            .ok_or_else(|| "program main is not a script function".to_string())?;
        write_usize(&mut bytes, main_chunk.code.len());
        bytes.extend_from_slice(&main_chunk.code);
        Ok(bytes)
    }

    /// Deserializes a program from the bytecode file format.
    ///
    /// Rejects files whose magic number reads byte-swapped (produced on a
    /// machine with the opposite byte order) or whose pointer width does
    /// not match this machine, with an explicit "recompile" message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Program, String> {
        let mut cursor = Cursor::new(bytes);
        if cursor.read_u8()? != BINARY_MARKER {
            return Err("not a bytecode file (missing binary marker)".to_string());
        }
        let magic = cursor.read_u32()?;
        if magic != MAGIC {
            if magic.swap_bytes() == MAGIC {
                return Err(
                    "bytecode was produced on a machine with different byte order; \
                     recompile for this machine"
                        .to_string(),
                );
            }
            return Err(format!("bad magic number 0x{:08X}", magic));
        }
        let version = cursor.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported bytecode version {}", version));
        }
        let pointer_width = cursor.read_u8()?;
        if pointer_width as usize != std::mem::size_of::<usize>() {
            return Err(format!(
                "bytecode was produced for {}-byte pointers; recompile for this machine",
                pointer_width
            ));
        }
        let metadata_len = cursor.read_usize()?;
        cursor.skip(metadata_len)?;

        let const_count = cursor.read_usize()?;
        let mut constants = ConstTable::new();
        for _ in 0..const_count {
            let value = deserialize_value(&mut cursor)?;
            constants.append_raw(value);
        }

        let main_len = cursor.read_usize()?;
        let code = cursor.read_slice(main_len)?.to_vec();
        let main = Function::new_script(
            "main",
            vec!["__argv__".to_string()],
            Rc::new(Chunk::from_code(code)),
            false,
        );

        Ok(Program {
            constants: Rc::new(constants),
            main,
            debug: None,
        })
    }
}

fn script_chunk(func: &Function) -> Option<&Chunk> {
    match func.kind() {
        FunctionKind::Script(s) => Some(&s.chunk),
        _ => None,
    }
}

fn write_usize(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&value.to_ne_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_usize(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn serialize_value(out: &mut Vec<u8>, value: &Value) -> Result<(), String> {
    match value {
        Value::Undefined => out.push(tag::UNDEFINED),
        Value::Null => out.push(tag::NULL),
        Value::Boolean(b) => {
            out.push(tag::BOOLEAN);
            out.push(u8::from(*b));
        }
        Value::Integer(n) => {
            out.push(tag::INTEGER);
            out.extend_from_slice(&n.to_ne_bytes());
        }
        Value::Double(n) => {
            out.push(tag::DOUBLE);
            out.extend_from_slice(&n.to_bits().to_ne_bytes());
        }
        Value::String(s) => {
            out.push(tag::STRING);
            write_string(out, s);
        }
        Value::Array(elements) => {
            out.push(tag::ARRAY);
            let elements = elements.borrow();
            write_usize(out, elements.len());
            for element in elements.iter() {
                serialize_value(out, element)?;
            }
        }
        Value::Function(func) => {
            let FunctionKind::Script(script) = func.kind() else {
                return Err(format!(
                    "cannot serialize native function '{}'",
                    func.name()
                ));
            };
            out.push(tag::FUNCTION);
            write_string(out, func.name());
            write_usize(out, script.arg_names.len());
            for name in &script.arg_names {
                write_string(out, name);
            }
            out.push(u8::from(script.is_generator));
            write_usize(out, script.chunk.code.len());
            out.extend_from_slice(&script.chunk.code);
        }
        Value::Object(_) => {
            return Err("cannot serialize object constant".to_string());
        }
    }
    Ok(())
}

fn deserialize_value(cursor: &mut Cursor<'_>) -> Result<Value, String> {
    let tag_byte = cursor.read_u8()?;
    match tag_byte {
        tag::UNDEFINED => Ok(Value::Undefined),
        tag::NULL => Ok(Value::Null),
        tag::BOOLEAN => Ok(Value::Boolean(cursor.read_u8()? != 0)),
        tag::INTEGER => Ok(Value::Integer(i64::from_ne_bytes(
            cursor.read_array::<8>()?,
        ))),
        tag::DOUBLE => Ok(Value::Double(f64::from_bits(u64::from_ne_bytes(
            cursor.read_array::<8>()?,
        )))),
        tag::STRING => Ok(Value::string(cursor.read_string()?)),
        tag::ARRAY => {
            let count = cursor.read_usize()?;
            let mut elements = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                elements.push(deserialize_value(cursor)?);
            }
            Ok(Value::array(elements))
        }
        tag::FUNCTION => {
            let name = cursor.read_string()?;
            let arg_count = cursor.read_usize()?;
            let mut arg_names = Vec::with_capacity(arg_count.min(256));
            for _ in 0..arg_count {
                arg_names.push(cursor.read_string()?);
            }
            let is_generator = cursor.read_u8()? != 0;
            let code_len = cursor.read_usize()?;
            let code = cursor.read_slice(code_len)?.to_vec();
            Ok(Value::Function(Function::new_script(
                name,
                arg_names,
                Rc::new(Chunk::from_code(code)),
                is_generator,
            )))
        }
        other => Err(format!("unknown constant tag {}", other)),
    }
}

/// Bounds-checked reader over the input bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Cursor<'a> {
        Cursor { bytes, offset: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, String> {
        let b = *self
            .bytes
            .get(self.offset)
            .ok_or_else(|| "unexpected end of bytecode file".to_string())?;
        self.offset += 1;
        Ok(b)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_ne_bytes(self.read_array::<4>()?))
    }

    fn read_usize(&mut self) -> Result<usize, String> {
        const WIDTH: usize = std::mem::size_of::<usize>();
        let slice = self.read_slice(WIDTH)?;
        let mut out = [0u8; WIDTH];
        out.copy_from_slice(slice);
        Ok(usize::from_ne_bytes(out))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| "unexpected end of bytecode file".to_string())?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_string(&mut self) -> Result<String, String> {
        let len = self.read_usize()?;
        let slice = self.read_slice(len)?;
        String::from_utf8(slice.to_vec()).map_err(|e| format!("invalid UTF-8 in string: {}", e))
    }

    fn skip(&mut self, len: usize) -> Result<(), String> {
        self.read_slice(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> Program {
        let mut constants = ConstTable::new();
        constants.add(Value::Integer(42));
        constants.add_string("greeting");
        constants.add(Value::Double(2.5));
        constants.add(Value::Function(Function::new_script(
            "helper",
            vec!["a".to_string(), "b".to_string()],
            Rc::new(Chunk::from_code(vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x42])),
            false,
        )));
        let main = Function::new_script(
            "main",
            vec!["__argv__".to_string()],
            Rc::new(Chunk::from_code(vec![0x02, 0x42])),
            false,
        );
        Program {
            constants: Rc::new(constants),
            main,
            debug: Some(DebugMap::from_source("let x = 42;")),
        }
    }

    #[test]
    fn test_round_trip_same_machine() {
        let program = sample_program();
        let bytes = program.to_bytes().unwrap();
        let restored = Program::from_bytes(&bytes).unwrap();

        assert_eq!(restored.constants.len(), program.constants.len());
        assert_eq!(restored.constants.get(0), Some(&Value::Integer(42)));
        assert_eq!(restored.constants.get(1), Some(&Value::string("greeting")));

        match restored.constants.get(3) {
            Some(Value::Function(f)) => {
                assert_eq!(f.name(), "helper");
                match f.kind() {
                    FunctionKind::Script(s) => {
                        assert_eq!(s.arg_names, vec!["a", "b"]);
                        assert_eq!(s.chunk.code, vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x42]);
                    }
                    _ => panic!("expected script function"),
                }
            }
            other => panic!("expected function constant, got {:?}", other),
        }

        match restored.main.kind() {
            FunctionKind::Script(s) => assert_eq!(s.chunk.code, vec![0x02, 0x42]),
            _ => panic!("expected script main"),
        }
        assert!(restored.debug.is_none());
    }

    #[test]
    fn test_byte_swapped_magic_reports_recompile() {
        let program = sample_program();
        let mut bytes = program.to_bytes().unwrap();
        bytes[1..5].reverse();
        let err = Program::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("recompile"), "unexpected error: {}", err);
    }

    #[test]
    fn test_wrong_pointer_width_rejected() {
        let program = sample_program();
        let mut bytes = program.to_bytes().unwrap();
        bytes[6] = 2;
        let err = Program::from_bytes(&bytes).unwrap_err();
        assert!(err.contains("recompile"), "unexpected error: {}", err);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let program = sample_program();
        let bytes = program.to_bytes().unwrap();
        let err = Program::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.contains("unexpected end"), "unexpected error: {}", err);
    }

    #[test]
    fn test_missing_marker_rejected() {
        assert!(Program::from_bytes(&[0x00, 0x11]).is_err());
        assert!(Program::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_debug_map_line_text() {
        let map = DebugMap::from_source("one\ntwo\nthree");
        assert_eq!(map.line_text(1), Some("one"));
        assert_eq!(map.line_text(3), Some("three"));
        assert_eq!(map.line_text(0), None);
        assert_eq!(map.line_text(4), None);
    }
}
