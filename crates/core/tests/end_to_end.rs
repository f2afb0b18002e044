//! Whole-pipeline tests: source text in, bytes out, on both backends.
//!
//! I/O is captured through thread-local buffers. The generated code calls
//! the capture functions on the same thread that filled the buffers, so
//! the thread-local round trip is sound even for native code.

use std::cell::RefCell;

use bfjolt_core::{compile, interpret, new_tape, TapeProgram};

thread_local! {
    static INPUT: RefCell<Vec<u8>> = RefCell::new(Vec::new());
    static OUTPUT: RefCell<Vec<u8>> = RefCell::new(Vec::new());
}

extern "C" fn capture_putchar(c: i32) -> i32 {
    OUTPUT.with(|out| out.borrow_mut().push(c as u8));
    1
}

extern "C" fn feed_getchar() -> i32 {
    INPUT.with(|input| {
        let mut input = input.borrow_mut();
        if input.is_empty() {
            -1
        } else {
            input.remove(0) as i32
        }
    })
}

fn run_captured(program: &dyn TapeProgram, input: &[u8]) -> Vec<u8> {
    INPUT.with(|i| *i.borrow_mut() = input.to_vec());
    OUTPUT.with(|o| o.borrow_mut().clear());

    let mut tape = new_tape();
    program.run_with_custom_io(&mut tape, capture_putchar, feed_getchar);

    OUTPUT.with(|o| o.borrow().clone())
}

fn run_interpreted(source: &[u8], input: &[u8]) -> Vec<u8> {
    let insns = compile(source).expect("test program should compile");
    run_captured(&interpret(&insns), input)
}

// https://en.wikipedia.org/wiki/Brainfuck#Hello_World!
const HELLO_WORLD: &[u8] = b"++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.\
    >---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";

#[test]
fn hello_world_interpreted() {
    assert_eq!(b"Hello World!\n".to_vec(), run_interpreted(HELLO_WORLD, b""));
}

#[test]
fn echo_until_end_of_input() {
    // Relies on end-of-input reading as -1.
    assert_eq!(b"abc".to_vec(), run_interpreted(b",+[-.,+]", b"abc"));
}

#[test]
fn copy_loop_feeds_output() {
    // 6 * 8 = 48 = '0'
    assert_eq!(b"0".to_vec(), run_interpreted(b"++++++[>++++++++<-]>.", b""));
}

#[test]
fn counter_cached_loop_feeds_output() {
    // 10 / 2 iterations adding 10 each: 50 = '2'
    assert_eq!(
        b"2".to_vec(),
        run_interpreted(b"++++++++++[-->++++++++++<]>.", b"")
    );
}

#[cfg(all(target_arch = "x86_64", unix))]
mod native {
    use super::*;
    use bfjolt_core::jit_compile;

    fn run_native(source: &[u8], input: &[u8]) -> Vec<u8> {
        let insns = compile(source).expect("test program should compile");
        let program = jit_compile(&insns).expect("mapping executable memory failed");
        run_captured(&program, input)
    }

    #[test]
    fn hello_world_native() {
        assert_eq!(b"Hello World!\n".to_vec(), run_native(HELLO_WORLD, b""));
    }

    #[test]
    fn backends_agree_byte_for_byte() {
        let programs: &[(&[u8], &[u8])] = &[
            (HELLO_WORLD, &b""[..]),
            (b",+[-.,+]", b"native"),
            (b"++++++[>++++++++<-]>.", b""),
            (b"++++++++++[-->++++++++++<]>.", b""),
            // multiplier loop with two targets, then print both
            (b"+++++++[->+++++++>++++++++++<<]>.>.", b""),
            // scan loop: park on the zero cell and print its neighbour
            (b"+++++++[->++++++++++<]>---[<]>>.", b""),
        ];

        for &(source, input) in programs {
            assert_eq!(
                run_interpreted(source, input),
                run_native(source, input),
                "{}",
                String::from_utf8_lossy(source)
            );
        }
    }
}
