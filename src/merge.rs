// The streaming merge engine. Binary operations walk two buffered cursors in
// lock-step: while either cursor sits on a run, the cursor with the longer
// run (the predator) decides what the combined output looks like over that
// span, and the other cursor (the prey) is advanced by the predator's run
// length. Once neither has a pending run, literal words are combined
// pairwise. Output always goes through a `Sink`, so the same code serves
// materialization, cardinality counting and short-circuiting probes.

use crate::cursor::BufferedCursor;
use crate::sink::{Sink, SinkResult};
use crate::word::Word;

/// Bitwise AND of two compressed streams into `sink`.
pub fn and_into<W: Word, S: Sink<W> + ?Sized>(a: &[W], b: &[W], sink: &mut S) -> SinkResult {
    let mut i = BufferedCursor::new(a);
    let mut j = BufferedCursor::new(b);
    while i.size() > 0 && j.size() > 0 {
        while i.run_len() > 0 || j.run_len() > 0 {
            let i_is_prey = i.run_len() < j.run_len();
            let (prey, predator) = if i_is_prey {
                (&mut i, &mut j)
            } else {
                (&mut j, &mut i)
            };
            let len = predator.run_len();
            if !predator.run_bit() {
                // a 0-run forces zeros regardless of the prey's content
                sink.add_empty_words(false, len)?;
                prey.discard_first_words(len);
            } else {
                // a 1-run is the identity: copy the prey, zero-pad past its end
                let copied = prey.discharge(sink, len)?;
                sink.add_empty_words(false, len - copied)?;
            }
            predator.discard_run();
        }
        let k = i.literal_count().min(j.literal_count());
        if k > 0 {
            for n in 0..k {
                sink.add_word(i.literal_word(n) & j.literal_word(n))?;
            }
            i.discard_literals(k);
            j.discard_literals(k);
        }
    }
    // the exhausted operand's implicit zero tail forces zeros: stop
    Ok(())
}

/// Bitwise OR of two compressed streams into `sink`.
pub fn or_into<W: Word, S: Sink<W> + ?Sized>(a: &[W], b: &[W], sink: &mut S) -> SinkResult {
    let mut i = BufferedCursor::new(a);
    let mut j = BufferedCursor::new(b);
    while i.size() > 0 && j.size() > 0 {
        while i.run_len() > 0 || j.run_len() > 0 {
            let i_is_prey = i.run_len() < j.run_len();
            let (prey, predator) = if i_is_prey {
                (&mut i, &mut j)
            } else {
                (&mut j, &mut i)
            };
            let len = predator.run_len();
            if predator.run_bit() {
                sink.add_empty_words(true, len)?;
                prey.discard_first_words(len);
            } else {
                let copied = prey.discharge(sink, len)?;
                sink.add_empty_words(false, len - copied)?;
            }
            predator.discard_run();
        }
        let k = i.literal_count().min(j.literal_count());
        if k > 0 {
            for n in 0..k {
                sink.add_word(i.literal_word(n) | j.literal_word(n))?;
            }
            i.discard_literals(k);
            j.discard_literals(k);
        }
    }
    let remaining = if i.size() > 0 { &mut i } else { &mut j };
    remaining.discharge_all(sink)
}

/// Bitwise XOR of two compressed streams into `sink`.
pub fn xor_into<W: Word, S: Sink<W> + ?Sized>(a: &[W], b: &[W], sink: &mut S) -> SinkResult {
    let mut i = BufferedCursor::new(a);
    let mut j = BufferedCursor::new(b);
    while i.size() > 0 && j.size() > 0 {
        while i.run_len() > 0 || j.run_len() > 0 {
            let i_is_prey = i.run_len() < j.run_len();
            let (prey, predator) = if i_is_prey {
                (&mut i, &mut j)
            } else {
                (&mut j, &mut i)
            };
            let len = predator.run_len();
            if predator.run_bit() {
                // XOR with a 1-run complements the prey; past the prey's end
                // the implicit zeros complement to ones
                let copied = prey.discharge_negated(sink, len)?;
                sink.add_empty_words(true, len - copied)?;
            } else {
                let copied = prey.discharge(sink, len)?;
                sink.add_empty_words(false, len - copied)?;
            }
            predator.discard_run();
        }
        let k = i.literal_count().min(j.literal_count());
        if k > 0 {
            for n in 0..k {
                sink.add_word(i.literal_word(n) ^ j.literal_word(n))?;
            }
            i.discard_literals(k);
            j.discard_literals(k);
        }
    }
    let remaining = if i.size() > 0 { &mut i } else { &mut j };
    remaining.discharge_all(sink)
}

/// Bitwise AND-NOT (`a & !b`) of two compressed streams into `sink`.
pub fn and_not_into<W: Word, S: Sink<W> + ?Sized>(a: &[W], b: &[W], sink: &mut S) -> SinkResult {
    let mut i = BufferedCursor::new(a);
    let mut j = BufferedCursor::new(b);
    while i.size() > 0 && j.size() > 0 {
        while i.run_len() > 0 || j.run_len() > 0 {
            let i_is_prey = i.run_len() < j.run_len();
            if i_is_prey {
                let (prey, predator) = (&mut i, &mut j);
                let len = predator.run_len();
                if predator.run_bit() {
                    // a & !1 == 0
                    sink.add_empty_words(false, len)?;
                    prey.discard_first_words(len);
                } else {
                    // a & !0 == a
                    let copied = prey.discharge(sink, len)?;
                    sink.add_empty_words(false, len - copied)?;
                }
                predator.discard_run();
            } else {
                let (prey, predator) = (&mut j, &mut i);
                let len = predator.run_len();
                if !predator.run_bit() {
                    // 0 & !b == 0
                    sink.add_empty_words(false, len)?;
                    prey.discard_first_words(len);
                } else {
                    // 1 & !b == !b
                    let copied = prey.discharge_negated(sink, len)?;
                    sink.add_empty_words(true, len - copied)?;
                }
                predator.discard_run();
            }
        }
        let k = i.literal_count().min(j.literal_count());
        if k > 0 {
            for n in 0..k {
                sink.add_word(i.literal_word(n) & !j.literal_word(n))?;
            }
            i.discard_literals(k);
            j.discard_literals(k);
        }
    }
    if i.size() > 0 {
        // the left operand keeps its remaining words; a remaining right
        // operand meets the left's implicit zero tail and contributes nothing
        i.discharge_all(sink)?;
    }
    Ok(())
}

/// Threshold-of-N: the output bit is 1 where at least `t` inputs have a 1.
pub fn threshold_into<W: Word, S: Sink<W> + ?Sized>(
    t: usize,
    inputs: &[&[W]],
    sink: &mut S,
) -> SinkResult {
    nary_into(
        inputs,
        sink,
        |ones| ones >= t,
        |words| threshold_word(words.iter().copied(), t),
    )
}

/// Symmetric difference of N streams: the output bit is the parity of the
/// input bits.
pub fn xor_multi_into<W: Word, S: Sink<W> + ?Sized>(inputs: &[&[W]], sink: &mut S) -> SinkResult {
    nary_into(
        inputs,
        sink,
        |ones| ones % 2 == 1,
        |words| words.iter().fold(W::zero(), |acc, &w| acc ^ w),
    )
}

/// N-way lock-step merge. Cursors advance together by the smallest current
/// run boundary; spans where every live cursor sits on a run are emitted as
/// runs, anything else is combined one word at a time. Exhausted inputs act
/// as infinite 0-runs.
fn nary_into<W: Word, S: Sink<W> + ?Sized>(
    inputs: &[&[W]],
    sink: &mut S,
    emit_run: impl Fn(usize) -> bool,
    emit_word: impl Fn(&[W]) -> W,
) -> SinkResult {
    let mut cursors: Vec<BufferedCursor<W>> =
        inputs.iter().map(|words| BufferedCursor::new(words)).collect();
    let mut scratch: Vec<W> = Vec::with_capacity(cursors.len());
    loop {
        let mut span = usize::MAX;
        let mut all_runs = true;
        let mut live = false;
        for cursor in cursors.iter().filter(|c| c.size() > 0) {
            live = true;
            if cursor.run_len() > 0 {
                span = span.min(cursor.run_len());
            } else {
                all_runs = false;
            }
        }
        if !live {
            return Ok(());
        }
        if all_runs {
            let ones = cursors
                .iter()
                .filter(|c| c.run_len() > 0 && c.run_bit())
                .count();
            sink.add_empty_words(emit_run(ones), span)?;
            for cursor in cursors.iter_mut() {
                cursor.discard_first_words(span);
            }
        } else {
            scratch.clear();
            for cursor in cursors.iter() {
                scratch.push(if cursor.size() == 0 {
                    W::zero()
                } else if cursor.run_len() > 0 {
                    if cursor.run_bit() {
                        W::ones()
                    } else {
                        W::zero()
                    }
                } else {
                    cursor.literal_word(0)
                });
            }
            sink.add_word(emit_word(&scratch))?;
            for cursor in cursors.iter_mut() {
                cursor.discard_first_words(1);
            }
        }
    }
}

/// Word-parallel threshold combine: bit `p` of the result is 1 where at
/// least `t` of the input words have bit `p` set. Accumulates per-position
/// counts in bit-sliced binary counters, then compares against the constant
/// `t` with a bitwise most-significant-first comparator.
pub(crate) fn threshold_word<W: Word>(words: impl Iterator<Item = W>, t: usize) -> W {
    let mut slices: Vec<W> = Vec::new();
    for w in words {
        let mut carry = w;
        for slice in slices.iter_mut() {
            let overflow = *slice & carry;
            *slice = *slice ^ carry;
            carry = overflow;
            if carry == W::zero() {
                break;
            }
        }
        if carry != W::zero() {
            slices.push(carry);
        }
    }
    let t_bits = (usize::BITS - t.leading_zeros()) as usize;
    let width = slices.len().max(t_bits);
    let mut gt = W::zero();
    let mut eq = W::ones();
    for idx in (0..width).rev() {
        let c = slices.get(idx).copied().unwrap_or_else(W::zero);
        let t_mask = if (t >> idx) & 1 == 1 {
            W::ones()
        } else {
            W::zero()
        };
        gt = gt | (eq & c & !t_mask);
        eq = eq & !(c ^ t_mask);
    }
    gt | eq
}
