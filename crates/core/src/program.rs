//! Defines [TapeProgram], which runs a compiled program regardless of which
//! backend produced it.

use std::io::{Read, Write};

/// Number of cells on the tape.
pub const TAPE_LEN: usize = 30_000;

/// Has the same shape as `libc`'s `putchar(3)`. `extern "C"` so generated
/// native code can call it directly.
pub type PutChar = extern "C" fn(i32) -> i32;
/// Has the same shape as `libc`'s `getchar(3)`: returns -1 at end of input.
pub type GetChar = extern "C" fn() -> i32;

/// A compiled program, ready to run. Just give it a tape!
pub trait TapeProgram {
    /// Runs the program against the given tape with the I/O primitives of
    /// your choosing. The tape is not bounds-checked: a program that walks
    /// off either end is undefined behaviour, exactly as in the source
    /// language.
    fn run_with_custom_io(&self, tape: &mut [i32], putchar: PutChar, getchar: GetChar);

    /// Runs the program against `stdin`/`stdout`.
    fn run(&self, tape: &mut [i32]) {
        self.run_with_custom_io(tape, putchar, getchar);
    }
}

/// A zeroed tape of [TAPE_LEN] cells.
pub fn new_tape() -> Vec<i32> {
    vec![0; TAPE_LEN]
}

/// Emulates libc's `putchar(3)`: writes the low byte of the cell.
extern "C" fn putchar(c: i32) -> i32 {
    let byte = [c as u8];
    let mut stdout = std::io::stdout();
    match stdout.write_all(&byte).and_then(|_| stdout.flush()) {
        Ok(()) => 1,
        Err(_) => -1,
    }
}

/// Emulates libc's `getchar(3)`: one byte, or -1 at end of input. The -1 is
/// stored verbatim into the cell; it is a sentinel, not an error.
extern "C" fn getchar() -> i32 {
    let mut one_byte = [0u8];
    match std::io::stdin().read_exact(&mut one_byte) {
        Ok(()) => one_byte[0] as i32,
        Err(_) => -1,
    }
}
