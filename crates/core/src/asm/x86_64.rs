//! Assembler for x86-64 (System V ABI).
//!
//! Unlike a fixed-width ISA there is no single patchable word per
//! instruction. Every branch is emitted with a 32-bit relative
//! displacement of zero and its byte position is recorded; a second pass
//! fills the displacements in once every label has a target.

use std::collections::HashMap;

/// Reference to one of the sixteen general-purpose registers.
///
/// The same number names the full register or its low 32 bits; which one
/// an instruction touches is decided by the instruction, not the operand.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct R(pub u8);

pub const RAX: R = R(0);
pub const RCX: R = R(1);
pub const RDX: R = R(2);
pub const RBX: R = R(3);
pub const RSI: R = R(6);
pub const RDI: R = R(7);
pub const R12: R = R(12);
pub const R13: R = R(13);

/// A branch label in the assembly.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Label(usize);

/// Generates x86-64 machine code.
pub struct X64Assembly {
    code: Vec<u8>,
    next_label: usize,
    // Maps labels to byte offsets in the code vector
    label_targets: HashMap<Label, usize>,
    // Byte offsets of rel32 fields still waiting for their label
    unresolved_branch_targets: Vec<(usize, Label)>,
}

impl X64Assembly {
    pub fn new() -> Self {
        X64Assembly {
            code: Vec::new(),
            next_label: 0,
            label_targets: HashMap::new(),
            unresolved_branch_targets: Vec::new(),
        }
    }

    /// Mints a label with no target yet.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Call this before the first instruction of the desired label.
    pub fn set_label_target(&mut self, label: Label) {
        self.label_targets.insert(label, self.code.len());
    }

    pub fn patch_branch_targets(&mut self) {
        let patch_list = std::mem::take(&mut self.unresolved_branch_targets);
        for (field, label) in patch_list {
            let target = self
                .label_targets
                .get(&label)
                .expect("should have seen label");

            // rel32 is measured from the end of the displacement field.
            let rel = (*target as i64) - (field as i64 + 4);
            let bytes = (rel as i32).to_le_bytes();
            self.code[field..field + 4].copy_from_slice(&bytes);
        }
    }

    /// Returns machine code.
    /// Panics if there are unresolved branch targets.
    pub fn machine_code(&self) -> &[u8] {
        let incomplete = self.unresolved_branch_targets.len();
        if incomplete > 0 {
            panic!(
                "tried to generate binary, but there are still {} unresolved branch targets!",
                incomplete
            );
        }

        &self.code[..]
    }

    // Instructions

    // Stack and control transfer /////////////////////////////////////////////////////////////////

    /// push r64
    pub fn push(&mut self, r: R) {
        self.rex_opt(false, R(0), r);
        self.emit(&[0x50 | low3(r)]);
    }

    /// pop r64
    pub fn pop(&mut self, r: R) {
        self.rex_opt(false, R(0), r);
        self.emit(&[0x58 | low3(r)]);
    }

    /// ret (return from subroutine)
    pub fn ret(&mut self) {
        self.emit(&[0xC3]);
    }

    /// call r64 (indirect, absolute)
    pub fn call(&mut self, r: R) {
        self.rex_opt(false, R(2), r);
        self.emit(&[0xFF, modrm_reg(R(2), r)]);
    }

    /// jz rel32
    pub fn jz(&mut self, label: Label) {
        self.emit(&[0x0F, 0x84]);
        self.emit_branch_displacement(label);
    }

    /// jnz rel32
    pub fn jnz(&mut self, label: Label) {
        self.emit(&[0x0F, 0x85]);
        self.emit_branch_displacement(label);
    }

    /// jmp rel32
    pub fn jmp(&mut self, label: Label) {
        self.emit(&[0xE9]);
        self.emit_branch_displacement(label);
    }

    // Moves //////////////////////////////////////////////////////////////////////////////////////

    /// mov r64, r64
    pub fn mov_reg(&mut self, dst: R, src: R) {
        self.rex_w(src, dst);
        self.emit(&[0x89, modrm_reg(src, dst)]);
    }

    /// mov r32, r32
    pub fn mov_reg32(&mut self, dst: R, src: R) {
        self.rex_opt(src.0 >= 8, src, dst);
        self.emit(&[0x89, modrm_reg(src, dst)]);
    }

    /// mov r32, dword [base + disp]
    pub fn load(&mut self, dst: R, base: R, disp: i32) {
        self.rex_opt(dst.0 >= 8, dst, base);
        self.emit(&[0x8B]);
        self.emit_mem_operand(dst, base, disp);
    }

    /// mov dword [base + disp], r32
    pub fn store(&mut self, base: R, disp: i32, src: R) {
        self.rex_opt(src.0 >= 8, src, base);
        self.emit(&[0x89]);
        self.emit_mem_operand(src, base, disp);
    }

    /// mov dword [base + disp], imm32
    pub fn store_imm(&mut self, base: R, disp: i32, imm: i32) {
        self.rex_opt(false, R(0), base);
        self.emit(&[0xC7]);
        self.emit_mem_operand(R(0), base, disp);
        self.emit(&imm.to_le_bytes());
    }

    // Arithmetic /////////////////////////////////////////////////////////////////////////////////

    /// add r64, imm (a negative immediate subtracts)
    pub fn add_reg_imm(&mut self, r: R, imm: i32) {
        self.rex_w(R(0), r);
        self.emit_group1_imm(modrm_reg(R(0), r), imm);
    }

    /// add r32, imm
    pub fn add_reg32_imm(&mut self, r: R, imm: i32) {
        self.rex_opt(false, R(0), r);
        self.emit_group1_imm(modrm_reg(R(0), r), imm);
    }

    /// add dword [base + disp], imm
    pub fn add_mem_imm(&mut self, base: R, disp: i32, imm: i32) {
        self.rex_opt(false, R(0), base);
        if let Ok(small) = i8::try_from(imm) {
            self.emit(&[0x83]);
            self.emit_mem_operand(R(0), base, disp);
            self.emit(&[small as u8]);
        } else {
            self.emit(&[0x81]);
            self.emit_mem_operand(R(0), base, disp);
            self.emit(&imm.to_le_bytes());
        }
    }

    /// add dword [base + disp], r32
    pub fn add_mem_reg(&mut self, base: R, disp: i32, src: R) {
        self.rex_opt(src.0 >= 8, src, base);
        self.emit(&[0x01]);
        self.emit_mem_operand(src, base, disp);
    }

    /// imul r32, r32, imm32
    pub fn imul_imm(&mut self, dst: R, src: R, imm: i32) {
        self.rex_opt(dst.0 >= 8, dst, src);
        self.emit(&[0x69, modrm_reg(dst, src)]);
        self.emit(&imm.to_le_bytes());
    }

    // Comparisons ////////////////////////////////////////////////////////////////////////////////

    /// cmp dword [base + disp], 0
    pub fn cmp_mem_zero(&mut self, base: R, disp: i32) {
        self.rex_opt(false, R(7), base);
        self.emit(&[0x83]);
        self.emit_mem_operand(R(7), base, disp);
        self.emit(&[0x00]);
    }

    /// test r32, r32
    pub fn test(&mut self, a: R, b: R) {
        self.rex_opt(b.0 >= 8, b, a);
        self.emit(&[0x85, modrm_reg(b, a)]);
    }

    // Private methods ////////////////////////////////////////////////////////////////////////////

    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn emit_branch_displacement(&mut self, label: Label) {
        let field = self.code.len();
        self.emit(&[0, 0, 0, 0]);
        self.unresolved_branch_targets.push((field, label));
    }

    /// REX.W prefix, always emitted for 64-bit operand size.
    fn rex_w(&mut self, reg: R, rm: R) {
        self.emit(&[0x48 | rex_r(reg) | rex_b(rm)]);
    }

    /// REX prefix for a 32-bit operation, only when an extended register
    /// forces one.
    fn rex_opt(&mut self, reg_extended: bool, reg: R, rm: R) {
        if reg_extended || rm.0 >= 8 {
            self.emit(&[0x40 | rex_r(reg) | rex_b(rm)]);
        }
    }

    /// Opcode 0x83/0x81 with /0: add with a sign-extended immediate.
    fn emit_group1_imm(&mut self, modrm: u8, imm: i32) {
        if let Ok(small) = i8::try_from(imm) {
            self.emit(&[0x83, modrm, small as u8]);
        } else {
            self.emit(&[0x81, modrm]);
            self.emit(&imm.to_le_bytes());
        }
    }

    /// ModRM (and displacement) for a `[base + disp]` operand.
    ///
    /// The callers only ever address through plain bases; rsp/r12 would
    /// need a SIB byte and rbp/r13 steal the disp-less encoding, so both
    /// get the displacement form instead of a special case.
    fn emit_mem_operand(&mut self, reg: R, base: R, disp: i32) {
        debug_assert!(low3(base) != 4, "rsp-family base needs a SIB byte");

        if disp == 0 && low3(base) != 5 {
            self.emit(&[modrm(0b00, reg, base)]);
        } else if let Ok(small) = i8::try_from(disp) {
            self.emit(&[modrm(0b01, reg, base), small as u8]);
        } else {
            self.emit(&[modrm(0b10, reg, base)]);
            self.emit(&disp.to_le_bytes());
        }
    }
}

fn low3(r: R) -> u8 {
    r.0 & 0b111
}

fn rex_r(reg: R) -> u8 {
    (reg.0 >> 3) << 2
}

fn rex_b(rm: R) -> u8 {
    rm.0 >> 3
}

fn modrm(mode: u8, reg: R, rm: R) -> u8 {
    (mode << 6) | (low3(reg) << 3) | low3(rm)
}

fn modrm_reg(reg: R, rm: R) -> u8 {
    modrm(0b11, reg, rm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(f: impl FnOnce(&mut X64Assembly)) -> Vec<u8> {
        let mut asm = X64Assembly::new();
        f(&mut asm);
        asm.patch_branch_targets();
        asm.machine_code().to_vec()
    }

    #[test]
    fn push_and_pop_extend_past_the_first_eight_registers() {
        assert_eq!(vec![0x53], emitted(|a| a.push(RBX)));
        assert_eq!(vec![0x41, 0x54], emitted(|a| a.push(R12)));
        assert_eq!(vec![0x41, 0x5D], emitted(|a| a.pop(R13)));
    }

    #[test]
    fn register_moves() {
        assert_eq!(vec![0x48, 0x89, 0xFB], emitted(|a| a.mov_reg(RBX, RDI)));
        assert_eq!(vec![0x49, 0x89, 0xF4], emitted(|a| a.mov_reg(R12, RSI)));
        assert_eq!(vec![0x89, 0xD0], emitted(|a| a.mov_reg32(RAX, RDX)));
    }

    #[test]
    fn loads_and_stores_pick_the_shortest_displacement() {
        assert_eq!(vec![0x8B, 0x03], emitted(|a| a.load(RAX, RBX, 0)));
        assert_eq!(vec![0x89, 0x4B, 0x04], emitted(|a| a.store(RBX, 4, RCX)));
        assert_eq!(
            vec![0x8B, 0x83, 0x00, 0x02, 0x00, 0x00],
            emitted(|a| a.load(RAX, RBX, 512))
        );
    }

    #[test]
    fn memory_arithmetic() {
        assert_eq!(vec![0x83, 0x03, 0x05], emitted(|a| a.add_mem_imm(RBX, 0, 5)));
        assert_eq!(
            vec![0x81, 0x03, 0x00, 0x01, 0x00, 0x00],
            emitted(|a| a.add_mem_imm(RBX, 0, 256))
        );
        assert_eq!(vec![0x01, 0x43, 0x04], emitted(|a| a.add_mem_reg(RBX, 4, RAX)));
        assert_eq!(
            vec![0xC7, 0x03, 0x00, 0x00, 0x00, 0x00],
            emitted(|a| a.store_imm(RBX, 0, 0))
        );
    }

    #[test]
    fn register_arithmetic() {
        assert_eq!(vec![0x48, 0x83, 0xC3, 0x04], emitted(|a| a.add_reg_imm(RBX, 4)));
        assert_eq!(vec![0x48, 0x83, 0xC3, 0xFC], emitted(|a| a.add_reg_imm(RBX, -4)));
        assert_eq!(vec![0x83, 0xC1, 0xFE], emitted(|a| a.add_reg32_imm(RCX, -2)));
        assert_eq!(
            vec![0x69, 0xC2, 0x03, 0x00, 0x00, 0x00],
            emitted(|a| a.imul_imm(RAX, RDX, 3))
        );
    }

    #[test]
    fn comparisons_and_calls() {
        assert_eq!(vec![0x83, 0x3B, 0x00], emitted(|a| a.cmp_mem_zero(RBX, 0)));
        assert_eq!(vec![0x85, 0xC9], emitted(|a| a.test(RCX, RCX)));
        assert_eq!(vec![0x41, 0xFF, 0xD4], emitted(|a| a.call(R12)));
    }

    #[test]
    fn forward_branches_are_patched_relative_to_their_own_end() {
        // jz +2 over a two-byte instruction.
        let code = emitted(|a| {
            let skip = a.fresh_label();
            a.jz(skip);
            a.test(RCX, RCX);
            a.set_label_target(skip);
        });
        assert_eq!(vec![0x0F, 0x84, 0x02, 0x00, 0x00, 0x00, 0x85, 0xC9], code);
    }

    #[test]
    fn backward_branches_get_negative_displacements() {
        let code = emitted(|a| {
            let head = a.fresh_label();
            a.set_label_target(head);
            a.jmp(head);
        });
        assert_eq!(vec![0xE9, 0xFB, 0xFF, 0xFF, 0xFF], code);
    }

    #[test]
    #[should_panic(expected = "unresolved branch targets")]
    fn machine_code_refuses_unpatched_branches() {
        let mut asm = X64Assembly::new();
        let nowhere = asm.fresh_label();
        asm.jmp(nowhere);
        asm.machine_code();
    }
}
