//! The [threaded code] backend: platform-independent, so it runs anywhere,
//! unlike the native code generator.
//!
//! The instruction stream is translated once into a parallel array of
//! (handler, operands) cells. Execution follows the handler pointer of each
//! cell directly — one indirect branch per instruction, with no central
//! switch re-decoding opcodes every step.
//!
//! [threaded code]: https://en.wikipedia.org/wiki/Threaded_code

use crate::inst::{Inst, InsnStream};
use crate::program::{GetChar, PutChar, TapeProgram};

/// A [TapeProgram] executed as threaded code.
pub struct ThreadedProgram {
    code: Vec<OpCell>,
}

type Handler = fn(&mut Machine, i32, i32);

/// One cell of the threaded program: what to do and its operands.
#[derive(Clone, Copy)]
struct OpCell {
    handler: Handler,
    a: i32,
    b: i32,
}

/// Execution state threaded through the handlers.
///
/// The tape pointer is raw on purpose: the language gives no bounds
/// guarantees, so neither does the interpreter.
struct Machine {
    mem: *mut i32,
    pc: usize,
    multiplier: i32,
    counter: i32,
    running: bool,
    putchar: PutChar,
    getchar: GetChar,
}

impl ThreadedProgram {
    pub fn new(insns: &InsnStream) -> Self {
        let code = insns.as_slice().iter().map(|&inst| translate(inst)).collect();
        ThreadedProgram { code }
    }
}

fn translate(inst: Inst) -> OpCell {
    let (handler, a, b): (Handler, i32, i32) = match inst {
        Inst::Get => (op_get, 0, 0),
        Inst::Put => (op_put, 0, 0),
        Inst::Open(d) => (op_open, d, 0),
        Inst::Close(b) => (op_close, b, 0),
        Inst::End => (op_end, 0, 0),
        Inst::Calc(n) => (op_calc, n, 0),
        Inst::Move(n) => (op_move, n, 0),
        Inst::Load(n) => (op_load, n, 0),
        Inst::SearchZero(n) => (op_search_zero, n, 0),
        Inst::MoveCalc { offset, delta } => (op_move_calc, offset as i32, delta as i32),
        Inst::MemMove { offset, mult } => (op_mem_move, offset as i32, mult as i32),
        Inst::SetMultiplier => (op_set_multiplier, 0, 0),
        Inst::CalcMult(k) => (op_calc_mult, k, 0),
        Inst::OpenFast(d) => (op_open_fast, d, 0),
        Inst::CloseFast(b) => (op_close_fast, b, 0),
        Inst::CalcFast(n) => (op_calc_fast, n, 0),
    };
    OpCell { handler, a, b }
}

impl TapeProgram for ThreadedProgram {
    fn run_with_custom_io(&self, tape: &mut [i32], putchar: PutChar, getchar: GetChar) {
        let mut m = Machine {
            mem: tape.as_mut_ptr(),
            pc: 0,
            multiplier: 0,
            counter: 0,
            running: true,
            putchar,
            getchar,
        };

        while m.running {
            let cell = self.code[m.pc];
            m.pc += 1;
            (cell.handler)(&mut m, cell.a, cell.b);
        }
    }
}

// Handlers. Each runs with `pc` already advanced past its own cell, so a
// branch distance d lands via `pc += d` / `pc -= d` exactly as encoded by
// the stream builder.

fn op_calc(m: &mut Machine, n: i32, _: i32) {
    unsafe { *m.mem = (*m.mem).wrapping_add(n) }
}

fn op_move(m: &mut Machine, n: i32, _: i32) {
    m.mem = m.mem.wrapping_offset(n as isize);
}

fn op_load(m: &mut Machine, n: i32, _: i32) {
    unsafe { *m.mem = n }
}

fn op_get(m: &mut Machine, _: i32, _: i32) {
    unsafe { *m.mem = (m.getchar)() }
}

fn op_put(m: &mut Machine, _: i32, _: i32) {
    unsafe {
        (m.putchar)(*m.mem);
    }
}

fn op_open(m: &mut Machine, d: i32, _: i32) {
    if unsafe { *m.mem } == 0 {
        m.pc += d as usize;
    }
}

fn op_close(m: &mut Machine, b: i32, _: i32) {
    m.pc -= b as usize;
}

fn op_search_zero(m: &mut Machine, stride: i32, _: i32) {
    unsafe {
        while *m.mem != 0 {
            m.mem = m.mem.wrapping_offset(stride as isize);
        }
    }
}

fn op_move_calc(m: &mut Machine, offset: i32, delta: i32) {
    unsafe {
        let cell = m.mem.wrapping_offset(offset as isize);
        *cell = (*cell).wrapping_add(delta);
    }
}

fn op_mem_move(m: &mut Machine, offset: i32, mult: i32) {
    unsafe {
        let cell = m.mem.wrapping_offset(offset as isize);
        *cell = (*cell).wrapping_add((*m.mem).wrapping_mul(mult));
        *m.mem = 0;
    }
}

fn op_set_multiplier(m: &mut Machine, _: i32, _: i32) {
    m.multiplier = unsafe { *m.mem };
}

fn op_calc_mult(m: &mut Machine, k: i32, _: i32) {
    unsafe { *m.mem = (*m.mem).wrapping_add(m.multiplier.wrapping_mul(k)) }
}

fn op_open_fast(m: &mut Machine, d: i32, _: i32) {
    m.counter = unsafe { *m.mem };
    if m.counter == 0 {
        // Skips the CloseFast too: memory was never dirtied, so there is
        // nothing to write back.
        m.pc += d as usize;
    }
}

fn op_calc_fast(m: &mut Machine, n: i32, _: i32) {
    m.counter = m.counter.wrapping_add(n);
}

fn op_close_fast(m: &mut Machine, b: i32, _: i32) {
    if m.counter != 0 {
        // Back to the cell after OpenFast: the counter must not be re-read
        // from its (stale) home cell.
        m.pc -= b as usize;
    } else {
        unsafe { *m.mem = m.counter }
    }
}

fn op_end(m: &mut Machine, _: i32, _: i32) {
    m.running = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    extern "C" fn null_putchar(_: i32) -> i32 {
        1
    }
    extern "C" fn null_getchar() -> i32 {
        -1
    }

    fn run_on(source: &[u8], tape: &mut [i32]) {
        let insns = compile(source).expect("test program should compile");
        ThreadedProgram::new(&insns).run_with_custom_io(tape, null_putchar, null_getchar);
    }

    #[test]
    fn reset_zero_is_immediate() {
        let mut tape = [200, 7];
        run_on(b"[-]", &mut tape);
        assert_eq!([0, 7], tape);
    }

    #[test]
    fn search_zero_moves_the_pointer_without_touching_cells() {
        // The trailing + proves the pointer stopped on the first zero cell.
        let mut tape = [5, 3, 0, 9];
        run_on(b"[>]+", &mut tape);
        assert_eq!([5, 3, 1, 9], tape);
    }

    #[test]
    fn mem_move_scales_and_clears() {
        let mut tape = [5, 0];
        run_on(b"[->++<]", &mut tape);
        assert_eq!([0, 10], tape);
    }

    #[test]
    fn multiplier_loop_feeds_two_targets() {
        let mut tape = [7, 0, 0];
        run_on(b"[->+>++<<]", &mut tape);
        assert_eq!([0, 7, 14], tape);
    }

    #[test]
    fn fast_loop_counts_down_in_twos() {
        let mut tape = [8, 0];
        run_on(b"[-->+<]", &mut tape);
        assert_eq!([0, 4], tape);
    }

    #[test]
    fn fast_loop_skips_when_counter_starts_at_zero() {
        let mut tape = [0, 3];
        run_on(b"[-->+<]", &mut tape);
        assert_eq!([0, 3], tape);
    }

    #[test]
    fn empty_loop_on_zero_cell_runs_zero_iterations() {
        let mut tape = [0, 0];
        run_on(b"[]+", &mut tape);
        assert_eq!([1, 0], tape);
    }

    #[test]
    fn nested_loops_drain_outside_in() {
        // 2 outer iterations, each adding 3 to cell 1 and moving it to cell 2.
        let mut tape = [0, 0, 0];
        run_on(b"++[>+++[>+<-]<-]", &mut tape);
        assert_eq!([0, 0, 6], tape);
    }

    #[test]
    fn end_of_input_stores_the_sentinel() {
        let mut tape = [99];
        run_on(b",", &mut tape);
        assert_eq!([-1], tape);
    }
}
