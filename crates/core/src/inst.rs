//! The instruction stream: a flat, backpatchable sequence of tagged
//! instructions. It is the peephole optimizer's workspace during compilation
//! and, once frozen, the sole input of both backends.

/// One compiled instruction.
///
/// Loop nesting is implicit: [Inst::Open] and [Inst::Close] are always paired,
/// and each carries the instruction-count distance to its partner. With `pc`
/// advanced past the instruction before it executes, `Open(d)` skips to the
/// cell one past its `Close` via `pc += d`, and `Close(b)` returns to its
/// `Open` via `pc -= b`. The distances are backpatched when the `Close` is
/// emitted, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
    /// Read one byte into the current cell; end of input stores -1.
    Get,
    /// Write the current cell's low byte.
    Put,
    /// Enter the loop, or skip past the matching [Inst::Close] if the current
    /// cell is zero.
    Open(i32),
    /// Jump back to the matching [Inst::Open] (which re-tests the cell).
    Close(i32),
    /// Terminates the stream. Both backends treat this as their sentinel.
    End,

    /// Add to the current cell.
    Calc(i32),
    /// Shift the tape pointer.
    Move(i32),
    /// Set the current cell unconditionally. `Load(0)` is the fused form of
    /// the decrement-until-zero loop.
    Load(i32),

    /// Advance the pointer by the stride until a zero cell is found.
    SearchZero(i32),
    /// Add `delta` to the cell at `offset`, with no net pointer movement.
    MoveCalc { offset: i16, delta: i16 },
    /// Add current-cell × `mult` to the cell at `offset`, then zero the
    /// current cell.
    MemMove { offset: i16, mult: i16 },

    /// Snapshot the current cell into the multiplier register.
    SetMultiplier,
    /// Add snapshot × k to the current cell.
    CalcMult(i32),

    /// Loop entry with the counter cached in a register for the whole loop.
    OpenFast(i32),
    /// Back-edge of a cached-counter loop. Jumps to the cell *after* the
    /// matching [Inst::OpenFast] so the counter is never re-read; the counter
    /// is written back to memory on fall-through only.
    CloseFast(i32),
    /// Arithmetic against the cached loop counter instead of memory.
    CalcFast(i32),
}

/// The growable instruction sequence under construction.
///
/// Grows at the tail only. The optimizer observes a bounded suffix through
/// [InsnStream::last_n] and rewrites it through [InsnStream::truncate_by] +
/// [InsnStream::push]; the stream builder backpatches `Open` payloads by
/// index. Nothing here knows about the builder's open-loop stack.
#[derive(Debug, Default)]
pub struct InsnStream {
    insns: Vec<Inst>,
}

impl InsnStream {
    pub fn new() -> Self {
        InsnStream { insns: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn push(&mut self, inst: Inst) {
        self.insns.push(inst);
    }

    /// Copies out the last `N` instructions, oldest first, or `None` if the
    /// stream is shorter than that.
    pub fn last_n<const N: usize>(&self) -> Option<[Inst; N]> {
        if self.insns.len() < N {
            return None;
        }
        let tail = &self.insns[self.insns.len() - N..];
        let mut window = [Inst::End; N];
        window.copy_from_slice(tail);
        Some(window)
    }

    /// Removes the last `n` instructions.
    ///
    /// Panics if the stream holds fewer than `n`; a rule may only delete what
    /// it has inspected.
    pub fn truncate_by(&mut self, n: usize) {
        assert!(n <= self.insns.len(), "truncated past the stream start");
        self.insns.truncate(self.insns.len() - n);
    }

    pub fn get(&self, index: usize) -> Inst {
        self.insns[index]
    }

    pub fn set(&mut self, index: usize, inst: Inst) {
        self.insns[index] = inst;
    }

    /// Writes the forward distance into a pending [Inst::Open].
    ///
    /// Panics if `index` does not hold an `Open`; only the stream builder's
    /// loop stack can know where one is pending.
    pub fn backpatch_open(&mut self, index: usize, distance: i32) {
        match self.insns[index] {
            Inst::Open(_) => self.insns[index] = Inst::Open(distance),
            other => panic!("backpatch target is not an open bracket: {:?}", other),
        }
    }

    pub fn as_slice(&self) -> &[Inst] {
        &self.insns
    }
}
