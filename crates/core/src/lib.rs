//! bfjolt internals.
//!
//! The compiler is a single forward pass: source tokens stream into an
//! [inst::InsnStream], and a set of peephole rules re-examines the tail of
//! the stream after every emission. Loops whose shape is recognized --
//! clears, scans, copy loops, multiplier loops -- collapse into dedicated
//! fused instructions as soon as their `]` arrives.
//!
//! A finished stream runs on either backend:
//!
//!  - the [threaded::ThreadedProgram] interpreter, which works everywhere or;
//!  - native machine code, which is injected into the currently running
//!    process and run directly (x86-64 only).

extern crate exec_mem;

use crate::codegen::CodeGenerator;
use crate::inst::InsnStream;
use crate::jit::CompiledProgram;
use crate::threaded::ThreadedProgram;

pub mod disasm;
pub mod errors;
pub mod inst;

mod asm;
mod codegen;
mod compile;
mod jit;
mod optimize;
mod program;
mod threaded;

pub use crate::compile::compile;
pub use crate::errors::CompilationError;
pub use crate::program::{new_tape, TapeProgram, TAPE_LEN};

/// Wrap the instruction stream in a threaded-code interpreter.
pub fn interpret(insns: &InsnStream) -> ThreadedProgram {
    ThreadedProgram::new(insns)
}

/// Compile the instruction stream to native code, injected into the current
/// process's image.
pub fn jit_compile(insns: &InsnStream) -> exec_mem::Result<CompiledProgram> {
    let mut gen = CodeGenerator::new();
    let code = gen.compile(insns);

    CompiledProgram::from_binary(code)
}
