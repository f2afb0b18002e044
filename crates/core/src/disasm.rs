//! Renders an instruction stream back to a symbolic token form.
//!
//! Unfused instructions print as their source tokens; fused ones get a
//! letter each. Verbose mode appends the numeric payloads, which is the
//! quickest way to see what the peephole rules did to a program.

use std::fmt::Write;

use crate::inst::Inst;

pub fn dump(insns: &[Inst], verbose: bool) -> String {
    let mut out = String::new();
    for &inst in insns {
        use Inst::*;
        match inst {
            Get => out.push(','),
            Put => out.push('.'),
            Open(_) => out.push('['),
            Close(_) => out.push(']'),
            OpenFast(_) => out.push('{'),
            CloseFast(_) => out.push('}'),
            SetMultiplier => out.push('X'),
            End => break,
            Calc(n) => payload(&mut out, 'c', n, verbose),
            Move(n) => payload(&mut out, 'm', n, verbose),
            Load(n) => payload(&mut out, 'l', n, verbose),
            SearchZero(n) => payload(&mut out, 's', n, verbose),
            CalcMult(k) => payload(&mut out, 'x', k, verbose),
            CalcFast(n) => payload(&mut out, 'f', n, verbose),
            MoveCalc { offset, delta } => pair(&mut out, 'C', offset, delta, verbose),
            MemMove { offset, mult } => pair(&mut out, 'M', offset, mult, verbose),
        }
    }
    out.push('\n');
    out
}

fn payload(out: &mut String, name: char, value: i32, verbose: bool) {
    out.push(name);
    if verbose {
        write!(out, "({})", value).unwrap();
    }
}

fn pair(out: &mut String, name: char, a: i16, b: i16, verbose: bool) {
    out.push(name);
    if verbose {
        write!(out, "({},{})", a, b).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    fn dump_source(source: &[u8], verbose: bool) -> String {
        let insns = compile(source).expect("test program should compile");
        dump(insns.as_slice(), verbose)
    }

    #[test]
    fn plain_tokens_round_trip_as_themselves() {
        assert_eq!("[.,]\n", dump_source(b"[.,]", false));
    }

    #[test]
    fn fused_instructions_print_one_letter_each() {
        assert_eq!("cm\n", dump_source(b"+++>>", false));
        assert_eq!("M\n", dump_source(b"[->++<]", false));
    }

    #[test]
    fn verbose_mode_appends_the_payloads() {
        assert_eq!("c(3)m(2)\n", dump_source(b"+++>>", true));
        assert_eq!("M(1,2)\n", dump_source(b"[->++<]", true));
        assert_eq!("{f(-2)C(1,1)}\n", dump_source(b"[-->+<]", true));
    }
}
