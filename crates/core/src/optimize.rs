//! Peephole rewrite rules over the tail of an [InsnStream].
//!
//! Every rule is a pure shape match on a bounded suffix: it either rewrites
//! exactly the instructions it inspected or does nothing. A non-match is not
//! an error. The stream builder invokes the relevant subset after every token,
//! so rules may rely on earlier rules having already canonicalized the tail
//! (e.g. adjacent arithmetic is always folded before a close-bracket rule
//! runs). No rule consults the builder's open-loop stack: close-shape rules
//! find their `Open` by scanning back from the `Close`, which is safe because
//! the body of a just-closed innermost loop contains no other `Open`.

use crate::inst::{Inst, InsnStream};

/// The arithmetic contribution of an instruction, if it is pure arithmetic.
fn calc_value(inst: Inst) -> Option<i32> {
    match inst {
        Inst::Calc(n) => Some(n),
        _ => None,
    }
}

/// The pointer displacement of an instruction, if it is a pure shift.
fn move_value(inst: Inst) -> Option<i32> {
    match inst {
        Inst::Move(n) => Some(n),
        _ => None,
    }
}

/// c(n) c(m) -> c(n+m); a zero sum eliminates both.
pub(crate) fn fuse_calc(s: &mut InsnStream) {
    let Some([a, b]) = s.last_n::<2>() else { return };
    let (Some(x), Some(y)) = (calc_value(a), calc_value(b)) else {
        return;
    };
    s.truncate_by(2);
    if x.wrapping_add(y) != 0 {
        s.push(Inst::Calc(x.wrapping_add(y)));
    }
}

/// m(n) m(m) -> m(n+m); a zero net shift eliminates both.
pub(crate) fn fuse_move(s: &mut InsnStream) {
    let Some([a, b]) = s.last_n::<2>() else { return };
    let (Some(x), Some(y)) = (move_value(a), move_value(b)) else {
        return;
    };
    s.truncate_by(2);
    if x + y != 0 {
        s.push(Inst::Move(x + y));
    }
}

/// l(x) c(y) -> l(x+y): arithmetic directly after a store folds into it.
pub(crate) fn fuse_load(s: &mut InsnStream) {
    let Some([Inst::Load(x), b]) = s.last_n::<2>() else {
        return;
    };
    let Some(y) = calc_value(b) else { return };
    s.truncate_by(2);
    s.push(Inst::Load(x.wrapping_add(y)));
}

/// l(x) l(y) -> l(y): the first store is dead.
pub(crate) fn dedup_load(s: &mut InsnStream) {
    let Some([Inst::Load(_), Inst::Load(y)]) = s.last_n::<2>() else {
        return;
    };
    s.truncate_by(2);
    s.push(Inst::Load(y));
}

/// [c(-1)] -> l(0): a decrement-until-zero loop is an unconditional store.
pub(crate) fn reset_zero(s: &mut InsnStream) {
    let Some([Inst::Open(_), Inst::Calc(-1), Inst::Close(_)]) = s.last_n::<3>() else {
        return;
    };
    s.truncate_by(3);
    s.push(Inst::Load(0));
}

/// [m(n)] -> s(n): a move-only loop scans for a zero cell.
///
/// A zero stride must not match: `[m(0)]` would spin in place and has to stay
/// a loop. (Folded moves never leave a `Move(0)` behind, so the guard is
/// belt-and-braces.)
pub(crate) fn search_zero(s: &mut InsnStream) {
    let Some([Inst::Open(_), b, Inst::Close(_)]) = s.last_n::<3>() else {
        return;
    };
    let Some(n) = move_value(b) else { return };
    if n == 0 {
        return;
    }
    s.truncate_by(3);
    s.push(Inst::SearchZero(n));
}

/// C(n,x) c(y) -> c(y) C(n,x): a plain calc commutes with an offset calc.
/// Re-fusing the hoisted calc with whatever preceded the offset calc is the
/// whole point.
pub(crate) fn hoist_calc(s: &mut InsnStream) {
    let Some([Inst::MoveCalc { offset, delta }, b]) = s.last_n::<2>() else {
        return;
    };
    let Some(y) = calc_value(b) else { return };
    s.truncate_by(2);
    s.push(Inst::Calc(y));
    fuse_calc(s);
    fuse_load(s);
    s.push(Inst::MoveCalc { offset, delta });
}

/// m(n) c(x) m(-n) -> C(n,x): arithmetic at an offset with the pointer
/// restored.
pub(crate) fn fuse_move_calc(s: &mut InsnStream) {
    let Some([a, b, c]) = s.last_n::<3>() else { return };
    let (Some(n), Some(x), Some(back)) = (move_value(a), calc_value(b), move_value(c)) else {
        return;
    };
    if n == 0 || back != -n {
        return;
    }
    let (Ok(offset), Ok(delta)) = (i16::try_from(n), i16::try_from(x)) else {
        return;
    };
    s.truncate_by(3);
    s.push(Inst::MoveCalc { offset, delta });
}

/// C(n,x) m(k) -> m(n) c(x) m(k-n): an offset calc followed by a plain move
/// spreads back out so the move can fold onward.
pub(crate) fn spread_move_calc(s: &mut InsnStream) {
    let Some([Inst::MoveCalc { offset, delta }, b]) = s.last_n::<2>() else {
        return;
    };
    let Some(k) = move_value(b) else { return };
    s.truncate_by(2);
    s.push(Inst::Move(offset as i32));
    fuse_move(s);
    s.push(Inst::Calc(delta as i32));
    fuse_calc(s);
    fuse_load(s);
    if k - offset as i32 != 0 {
        s.push(Inst::Move(k - offset as i32));
        fuse_move(s);
    }
}

/// Two adjacent offset calcs. Same offset: fold. Different offsets: spread
/// into the explicit move/calc/move/calc/move form so later moves can fold
/// into the tail.
pub(crate) fn merge_move_calc(s: &mut InsnStream) {
    let Some(
        [Inst::MoveCalc {
            offset: a,
            delta: x,
        }, Inst::MoveCalc {
            offset: b,
            delta: y,
        }],
    ) = s.last_n::<2>()
    else {
        return;
    };
    s.truncate_by(2);
    if a == b {
        let sum = x.wrapping_add(y);
        if sum != 0 {
            s.push(Inst::MoveCalc {
                offset: a,
                delta: sum,
            });
        }
        return;
    }
    s.push(Inst::Move(a as i32));
    fuse_move(s);
    s.push(Inst::Calc(x as i32));
    fuse_calc(s);
    s.push(Inst::Move(b as i32 - a as i32));
    s.push(Inst::Calc(y as i32));
    s.push(Inst::Move(-(b as i32)));
}

/// [c(-1) C(n,x)] -> M(n,x): a loop that drains its own counter while adding
/// at a fixed offset becomes one scaled accumulate.
pub(crate) fn mem_move(s: &mut InsnStream) {
    let Some([Inst::Open(_), Inst::Calc(-1), Inst::MoveCalc { offset, delta }, Inst::Close(_)]) =
        s.last_n::<4>()
    else {
        return;
    };
    s.truncate_by(4);
    s.push(Inst::MemMove {
        offset,
        mult: delta,
    });
}

/// Finds the `Open` matching the `Close` at the tail, scanning backwards.
///
/// Returns `None` when the tail is not a `Close` or the body in between holds
/// anything that is not plain arithmetic or a plain shift. Since a close-shape
/// rule only ever fires for the innermost just-closed loop, any bracket found
/// inside the body belongs to a surviving nested loop and disqualifies the
/// match anyway.
fn closed_simple_loop(s: &InsnStream) -> Option<usize> {
    let insns = s.as_slice();
    let n = insns.len();
    if n < 2 || !matches!(insns[n - 1], Inst::Close(_)) {
        return None;
    }
    let mut i = n - 2;
    loop {
        match insns[i] {
            Inst::Open(_) => return Some(i),
            Inst::Calc(_) | Inst::Move(_) if i > 0 => i -= 1,
            _ => return None,
        }
    }
}

/// The generalized multiplier loop.
///
/// A loop whose body is only calc/move, with zero net displacement, and whose
/// home cell drops by exactly 1 per iteration, runs `counter` times; so every
/// off-home increment is really `counter × k`. Rewrites to: snapshot the
/// counter, zero it, then replay the body with off-home calcs as `x(k)` and
/// home calcs dropped.
pub(crate) fn multiplier_loop(s: &mut InsnStream) {
    let Some(open) = closed_simple_loop(s) else { return };
    let insns = s.as_slice();
    let body = &insns[open + 1..insns.len() - 1];

    let mut disp = 0i32;
    let mut counter_delta = 0i32;
    for &inst in body {
        match inst {
            Inst::Move(m) => disp += m,
            Inst::Calc(x) => {
                if disp == 0 {
                    counter_delta += x;
                }
            }
            _ => unreachable!("loop body vetted by closed_simple_loop"),
        }
    }
    if disp != 0 || counter_delta != -1 {
        return;
    }

    let mut rewritten = vec![Inst::SetMultiplier, Inst::Load(0)];
    let mut disp = 0i32;
    for &inst in body {
        match inst {
            Inst::Move(m) => {
                disp += m;
                rewritten.push(inst);
            }
            Inst::Calc(x) => {
                if disp != 0 {
                    rewritten.push(Inst::CalcMult(x));
                }
            }
            _ => unreachable!(),
        }
    }

    let count = s.len() - open;
    s.truncate_by(count);
    for inst in rewritten {
        s.push(inst);
    }
}

/// The cached-counter loop.
///
/// An innermost loop with zero net displacement keeps its counter in a
/// register: the brackets are retagged to their fast forms and every calc
/// landing back on the home offset is retargeted at the register. Distances
/// are unchanged, so the backpatched payloads stay valid.
///
/// The rewrite is sound only while nothing else in the body can observe or
/// clobber the home cell, and while the counter survives in its register:
/// I/O and nested loops (which occupy registers), scans (undeterminable
/// displacement), and any fused instruction whose footprint includes the home
/// offset all disqualify the loop. Runs last of the close-shape rules; loops
/// the earlier rules could collapse never get here.
pub(crate) fn fast_loop(s: &mut InsnStream) {
    let insns = s.as_slice();
    let n = insns.len();
    if n < 3 || !matches!(insns[n - 1], Inst::Close(_)) {
        return;
    }

    // Scan back for the matching bracket. A nested loop's Close (or a fast
    // loop's CloseFast) is met before its Open and rejects the whole match.
    let close = n - 1;
    let mut i = close - 1;
    let open = loop {
        match insns[i] {
            Inst::Open(_) => break i,
            Inst::Calc(_)
            | Inst::Move(_)
            | Inst::Load(_)
            | Inst::MoveCalc { .. }
            | Inst::MemMove { .. }
            | Inst::SetMultiplier
            | Inst::CalcMult(_)
                if i > 0 =>
            {
                i -= 1;
            }
            _ => return,
        }
    };
    if open + 1 == close {
        // [] never runs or never terminates; caching buys nothing.
        return;
    }

    let mut disp = 0i32;
    for &inst in &insns[open + 1..close] {
        match inst {
            Inst::Move(m) => disp += m,
            // A home calc is retargeted below; anywhere else it is plain
            // memory arithmetic.
            Inst::Calc(_) => {}
            Inst::Load(_) if disp == 0 => return,
            Inst::Load(_) => {}
            Inst::MoveCalc { offset, .. } if disp + offset as i32 == 0 => return,
            Inst::MoveCalc { .. } => {}
            Inst::MemMove { offset, .. } => {
                if disp == 0 || disp + offset as i32 == 0 {
                    return;
                }
            }
            Inst::SetMultiplier | Inst::CalcMult(_) => {
                if disp == 0 {
                    return;
                }
            }
            _ => unreachable!("vetted by the bracket scan"),
        }
    }
    if disp != 0 {
        return;
    }

    let (Inst::Open(d), Inst::Close(b)) = (s.get(open), s.get(close)) else {
        unreachable!("vetted by the bracket scan");
    };
    s.set(open, Inst::OpenFast(d));
    s.set(close, Inst::CloseFast(b - 1));

    let mut disp = 0i32;
    for i in open + 1..close {
        match s.get(i) {
            Inst::Move(m) => disp += m,
            Inst::Calc(x) if disp == 0 => s.set(i, Inst::CalcFast(x)),
            _ => {}
        }
    }
}
