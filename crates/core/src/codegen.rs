//! Generates machine code for a given instruction stream.

use crate::asm::x86_64::{Label, X64Assembly, R, R12, R13, RAX, RBX, RCX, RDI, RDX, RSI};
use crate::inst::{Inst, InsnStream};

// REGISTERS:
//
// rbx (callee saved) - current pointer on the tape (during function)
const ADDR: R = RBX;
// r12 (callee saved) - putchar (during function)
const PUTCHAR: R = R12;
// r13 (callee saved) - getchar (during function)
const GETCHAR: R = R13;
// eax                - working cell value
const VAL: R = RAX;
// edx                - multiplier snapshot
const MULT: R = RDX;
// ecx                - cached loop counter
const COUNTER: R = RCX;
//
// rdi (argument)     - pointer to the tape
// rsi (argument)     - putchar
// rdx (argument)     - getchar
//
// edx and ecx are caller saved, but the peephole rules never admit I/O
// into a multiplier or counter-cached loop, so neither value is ever
// live across a call.
//
// see: https://en.wikipedia.org/wiki/X86_calling_conventions#System_V_AMD64_ABI

/// Width of one tape cell in bytes.
const CELL: i32 = 4;

/// Takes an instruction stream and compiles it to an executable.
pub struct CodeGenerator {
    asm: X64Assembly,
    // (head, exit) of every loop still open, innermost last
    open_loops: Vec<(Label, Label)>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator {
            asm: X64Assembly::new(),
            open_loops: Vec::new(),
        }
    }

    pub fn compile(&mut self, insns: &InsnStream) -> &[u8] {
        assert!(
            matches!(insns.as_slice().last(), Some(Inst::End)),
            "expected end as last instruction, so that the function returns"
        );

        self.save_registers_and_load_arguments();

        // First pass: generate instructions, but branches will be incomplete.
        for &inst in insns.as_slice() {
            self.generate_instructions(inst);
        }
        assert!(self.open_loops.is_empty(), "unpaired loop in instruction stream");

        // Second pass: patch all incomplete branches.
        self.asm.patch_branch_targets();

        self.asm.machine_code()
    }

    // Three pushes plus the return address leave the stack 16-byte aligned
    // for the calls out to putchar and getchar.
    fn save_registers_and_load_arguments(&mut self) {
        self.asm.push(ADDR);
        self.asm.push(PUTCHAR);
        self.asm.push(GETCHAR);

        self.asm.mov_reg(ADDR, RDI);
        self.asm.mov_reg(PUTCHAR, RSI);
        self.asm.mov_reg(GETCHAR, RDX);
    }

    fn restore_registers_and_return(&mut self) {
        self.asm.pop(GETCHAR);
        self.asm.pop(PUTCHAR);
        self.asm.pop(ADDR);
        self.asm.ret();
    }

    fn generate_instructions(&mut self, inst: Inst) {
        use Inst::*;
        match inst {
            Calc(n) => {
                if n != 0 {
                    self.asm.add_mem_imm(ADDR, 0, n);
                }
            }
            Move(n) => {
                if n != 0 {
                    self.asm.add_reg_imm(ADDR, CELL * n);
                }
            }
            Load(n) => {
                self.asm.store_imm(ADDR, 0, n);
            }
            Put => {
                self.asm.load(RDI, ADDR, 0);
                self.asm.call(PUTCHAR);
            }
            Get => {
                self.asm.call(GETCHAR);
                self.asm.store(ADDR, 0, VAL);
            }
            Open(_) => {
                let head = self.asm.fresh_label();
                let exit = self.asm.fresh_label();
                self.asm.set_label_target(head);
                self.asm.cmp_mem_zero(ADDR, 0);
                self.asm.jz(exit);
                self.open_loops.push((head, exit));
            }
            Close(_) => {
                let (head, exit) = self.open_loops.pop().expect("close without open");
                self.asm.jmp(head);
                self.asm.set_label_target(exit);
            }
            SearchZero(stride) => {
                // Rotated: one test up front, then a two-instruction
                // advance-and-test loop.
                let head = self.asm.fresh_label();
                let exit = self.asm.fresh_label();
                self.asm.cmp_mem_zero(ADDR, 0);
                self.asm.jz(exit);
                self.asm.set_label_target(head);
                self.asm.add_reg_imm(ADDR, CELL * stride);
                self.asm.cmp_mem_zero(ADDR, 0);
                self.asm.jnz(head);
                self.asm.set_label_target(exit);
            }
            MoveCalc { offset, delta } => {
                self.asm.add_mem_imm(ADDR, CELL * offset as i32, delta as i32);
            }
            MemMove { offset, mult } => {
                self.asm.load(VAL, ADDR, 0);
                if mult != 1 {
                    self.asm.imul_imm(VAL, VAL, mult as i32);
                }
                self.asm.add_mem_reg(ADDR, CELL * offset as i32, VAL);
                self.asm.store_imm(ADDR, 0, 0);
            }
            SetMultiplier => {
                self.asm.load(MULT, ADDR, 0);
            }
            CalcMult(k) => {
                if k == 1 {
                    self.asm.add_mem_reg(ADDR, 0, MULT);
                } else {
                    self.asm.imul_imm(VAL, MULT, k);
                    self.asm.add_mem_reg(ADDR, 0, VAL);
                }
            }
            OpenFast(_) => {
                let body = self.asm.fresh_label();
                let skip = self.asm.fresh_label();
                self.asm.load(COUNTER, ADDR, 0);
                self.asm.test(COUNTER, COUNTER);
                self.asm.jz(skip);
                // The home pointer is saved once, outside the back-edge, so
                // the write-back below targets the counter's cell no matter
                // where the body leaves the pointer.
                self.asm.push(ADDR);
                self.asm.set_label_target(body);
                self.open_loops.push((body, skip));
            }
            CloseFast(_) => {
                let (body, skip) = self.open_loops.pop().expect("close without open");
                self.asm.test(COUNTER, COUNTER);
                self.asm.jnz(body);
                // Fell through: the loop ran, so the stale home cell needs
                // the (zero) counter written back. The skip path jumps past
                // this store.
                self.asm.pop(ADDR);
                self.asm.store(ADDR, 0, COUNTER);
                self.asm.set_label_target(skip);
            }
            CalcFast(n) => {
                self.asm.add_reg32_imm(COUNTER, n);
            }
            End => {
                self.restore_registers_and_return();
            }
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        CodeGenerator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    fn codegen(source: &[u8]) -> Vec<u8> {
        let insns = compile(source).expect("test program should compile");
        let mut gen = CodeGenerator::new();
        gen.compile(&insns).to_vec()
    }

    // push rbx; push r12; push r13; mov rbx, rdi; mov r12, rsi; mov r13, rdx
    const PROLOGUE: &[u8] = &[
        0x53, 0x41, 0x54, 0x41, 0x55, 0x48, 0x89, 0xFB, 0x49, 0x89, 0xF4, 0x49, 0x89, 0xD5,
    ];
    // pop r13; pop r12; pop rbx; ret
    const EPILOGUE: &[u8] = &[0x41, 0x5D, 0x41, 0x5C, 0x5B, 0xC3];

    #[test]
    fn empty_program_is_all_prologue_and_epilogue() {
        let code = codegen(b"");
        assert_eq!([PROLOGUE, EPILOGUE].concat(), code);
    }

    #[test]
    fn fused_adds_become_one_memory_add() {
        let code = codegen(b"+++");
        let body = &code[PROLOGUE.len()..code.len() - EPILOGUE.len()];
        // add dword [rbx], 3
        assert_eq!(&[0x83, 0x03, 0x03], body);
    }

    #[test]
    fn pointer_moves_are_scaled_to_cell_width() {
        let code = codegen(b">>");
        let body = &code[PROLOGUE.len()..code.len() - EPILOGUE.len()];
        // add rbx, 8
        assert_eq!(&[0x48, 0x83, 0xC3, 0x08], body);
    }

    #[test]
    fn plain_loop_checks_at_the_head_and_jumps_back() {
        let code = codegen(b"[.-]");
        let body = &code[PROLOGUE.len()..code.len() - EPILOGUE.len()];
        let expected: Vec<u8> = vec![
            // head: cmp dword [rbx], 0; jz exit (+13)
            0x83, 0x3B, 0x00, 0x0F, 0x84, 0x0D, 0x00, 0x00, 0x00,
            // mov edi, [rbx]; call r12
            0x8B, 0x3B, 0x41, 0xFF, 0xD4,
            // add dword [rbx], -1
            0x83, 0x03, 0xFF,
            // jmp head (-22)
            0xE9, 0xEA, 0xFF, 0xFF, 0xFF,
        ];
        assert_eq!(expected, body);
    }

    #[test]
    fn copy_loop_is_branch_free() {
        let code = codegen(b"[->++<]");
        let body = &code[PROLOGUE.len()..code.len() - EPILOGUE.len()];
        let expected: Vec<u8> = vec![
            // mov eax, [rbx]; imul eax, eax, 2
            0x8B, 0x03, 0x69, 0xC0, 0x02, 0x00, 0x00, 0x00,
            // add [rbx + 4], eax; mov dword [rbx], 0
            0x01, 0x43, 0x04, 0xC7, 0x03, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(expected, body);
    }

    #[test]
    fn counter_cached_loop_only_writes_back_on_the_fallthrough_path() {
        let code = codegen(b"[-->+<]");
        let body = &code[PROLOGUE.len()..code.len() - EPILOGUE.len()];
        let expected: Vec<u8> = vec![
            // mov ecx, [rbx]; test ecx, ecx; jz skip (+19); push rbx
            0x8B, 0x0B, 0x85, 0xC9, 0x0F, 0x84, 0x13, 0x00, 0x00, 0x00, 0x53,
            // body: add ecx, -2; add dword [rbx + 1 cell], 1
            0x83, 0xC1, 0xFE, 0x83, 0x43, 0x04, 0x01,
            // test ecx, ecx; jnz body (-15)
            0x85, 0xC9, 0x0F, 0x85, 0xF1, 0xFF, 0xFF, 0xFF,
            // pop rbx; mov [rbx], ecx; skip:
            0x5B, 0x89, 0x0B,
        ];
        assert_eq!(expected, body);
    }
}
