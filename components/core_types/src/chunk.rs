//! Bytecode chunk: one function's instruction bytes and debug lines.

/// A compiled function body.
///
/// The byte buffer holds the linear instruction stream; the line table is
/// an ordered list of (instruction offset, source line) pairs used to
/// render script stack traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// Raw instruction bytes
    pub code: Vec<u8>,
    /// (offset, line) pairs, ordered by offset
    pub lines: Vec<(usize, u32)>,
}

impl Chunk {
    /// Creates an empty chunk.
    pub fn new() -> Chunk {
        Chunk {
            code: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Creates a chunk from raw bytes with no line information.
    pub fn from_code(code: Vec<u8>) -> Chunk {
        Chunk {
            code,
            lines: Vec::new(),
        }
    }

    /// Records that the instruction starting at `offset` came from `line`.
    ///
    /// Consecutive records for the same line are collapsed.
    pub fn mark_line(&mut self, offset: usize, line: u32) {
        if let Some(&(_, last)) = self.lines.last() {
            if last == line {
                return;
            }
        }
        self.lines.push((offset, line));
    }

    /// The source line for the instruction at `offset`, if known.
    pub fn line_for(&self, offset: usize) -> Option<u32> {
        let mut result = None;
        for &(start, line) in &self.lines {
            if start > offset {
                break;
            }
            result = Some(line);
        }
        result
    }
}
