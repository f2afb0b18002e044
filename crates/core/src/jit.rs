//! Runs generated machine code in the current process's image.

use exec_mem::{as_function, ExecutableRegion, WritableRegion};

use crate::program::{GetChar, PutChar, TapeProgram};

/// A [TapeProgram] backed by native machine code.
pub struct CompiledProgram {
    code: ExecutableRegion,
}

/// The calling convention [crate::codegen::CodeGenerator] emits.
type RawProgram = unsafe extern "C" fn(*mut i32, PutChar, GetChar);

impl CompiledProgram {
    pub fn from_binary(binary: &[u8]) -> exec_mem::Result<CompiledProgram> {
        let mut mem = WritableRegion::allocate(binary.len())?;
        mem[..binary.len()].copy_from_slice(binary);

        Ok(CompiledProgram {
            code: mem.into_executable()?,
        })
    }
}

impl TapeProgram for CompiledProgram {
    fn run_with_custom_io(&self, tape: &mut [i32], putchar: PutChar, getchar: GetChar) {
        let program = unsafe { as_function!(self.code, RawProgram) };

        unsafe { program(tape.as_mut_ptr(), putchar, getchar) };
    }
}
