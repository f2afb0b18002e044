//! The stream builder: translates source tokens into instructions, re-invokes
//! the peephole rules after every emission, and backpatches loop distances.
//!
//! The eight tokens are `+ - > < , . [ ]`; every other byte is a comment.
//! Open-loop positions live in an owned stack here and nowhere else — the
//! optimizer only ever sees the trailing window of the stream.

use crate::errors::{CompilationError, Location, Reason};
use crate::inst::{Inst, InsnStream};
use crate::optimize;

/// Compiles a whole source text into a finished, optimized instruction
/// stream, terminated by [Inst::End].
pub fn compile(source: &[u8]) -> Result<InsnStream, CompilationError> {
    let mut compiler = Compiler::new();
    for &byte in source {
        compiler.push_token(byte)?;
    }
    compiler.finish()
}

pub struct Compiler {
    stream: InsnStream,
    open_loops: Vec<usize>,
    line: u32,
    column: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            stream: InsnStream::new(),
            open_loops: Vec::new(),
            line: 1,
            column: 0,
        }
    }

    /// Feeds one source byte through the compiler.
    pub fn push_token(&mut self, byte: u8) -> Result<(), CompilationError> {
        if byte == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }

        match byte {
            b'+' => self.push_calc(1),
            b'-' => self.push_calc(-1),
            b'>' => self.push_move(1),
            b'<' => self.push_move(-1),
            b',' => self.stream.push(Inst::Get),
            b'.' => self.stream.push(Inst::Put),
            b'[' => self.push_open(),
            b']' => self.push_close()?,
            _ => {} // comment
        }
        Ok(())
    }

    /// Ends the stream. Fails if any loop is still open.
    pub fn finish(mut self) -> Result<InsnStream, CompilationError> {
        if !self.open_loops.is_empty() {
            return Err(CompilationError::without_location(
                Reason::NotEnoughCloseBrackets,
            ));
        }
        self.stream.push(Inst::End);
        Ok(self.stream)
    }

    fn push_calc(&mut self, delta: i32) {
        self.stream.push(Inst::Calc(delta));
        optimize::fuse_calc(&mut self.stream);
        optimize::hoist_calc(&mut self.stream);
        optimize::fuse_load(&mut self.stream);
        optimize::dedup_load(&mut self.stream);
    }

    fn push_move(&mut self, delta: i32) {
        self.stream.push(Inst::Move(delta));
        optimize::fuse_move(&mut self.stream);
        optimize::spread_move_calc(&mut self.stream);
        optimize::fuse_move_calc(&mut self.stream);
        optimize::merge_move_calc(&mut self.stream);
    }

    fn push_open(&mut self) {
        self.open_loops.push(self.stream.len());
        self.stream.push(Inst::Open(0));
    }

    fn push_close(&mut self) -> Result<(), CompilationError> {
        let open = self.open_loops.pop().ok_or_else(|| {
            CompilationError::new(
                Reason::TooManyCloseBrackets,
                Location::new(self.line, self.column),
            )
        })?;

        let distance = (self.stream.len() - open) as i32;
        self.stream.backpatch_open(open, distance);
        self.stream.push(Inst::Close(distance + 1));

        // Loop-shape rules, cheapest first; each relies on the previous ones
        // having already failed or canonicalized the tail.
        optimize::reset_zero(&mut self.stream);
        optimize::dedup_load(&mut self.stream);
        optimize::search_zero(&mut self.stream);
        optimize::mem_move(&mut self.stream);
        optimize::multiplier_loop(&mut self.stream);
        optimize::fast_loop(&mut self.stream);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}
