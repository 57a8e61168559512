// The compressed bitmap facade: a buffer, the position of the open header
// word being appended to, and the logical bit length. Append paths extend
// the open header in O(1); random-access mutation locates the containing
// chunk and splices runs apart when needed. All logical combinations go
// through the merge engine and produce freshly allocated outputs.

use core::marker::PhantomData;

use crate::buffer::{Buffer, BufferMut, GrowableBuffer, ViewBuffer};
use crate::chunk::Chunks;
use crate::cursor::RawCursor;
use crate::error::{Error, Result};
use crate::merge;
use crate::sink::{BitCounter, NonEmptyProbe, Sink, SinkResult};
use crate::word::Word;

#[derive(Debug, Clone)]
pub struct Ewah<W: Word = u64, B: Buffer<W> = GrowableBuffer<W>> {
    buffer: B,
    // position of the open header word; always the last header in the buffer
    rlw_pos: usize,
    size_in_bits: usize,
    marker: PhantomData<W>,
}

/// The primary 64-bit-word variant.
pub type Ewah64 = Ewah<u64, GrowableBuffer<u64>>;

/// The narrower 32-bit-word variant: same layout, smaller constants.
pub type Ewah32 = Ewah<u32, GrowableBuffer<u32>>;

/// Zero-copy read-only bitmap over externally owned words.
pub type EwahView<'a, W = u64> = Ewah<W, ViewBuffer<'a, W>>;

impl<W: Word> Ewah<W, GrowableBuffer<W>> {
    pub fn new() -> Self {
        Self {
            buffer: GrowableBuffer::new(),
            rlw_pos: 0,
            size_in_bits: 0,
            marker: PhantomData,
        }
    }

    pub fn with_word_capacity(capacity: usize) -> Self {
        Self {
            buffer: GrowableBuffer::with_capacity(capacity),
            rlw_pos: 0,
            size_in_bits: 0,
            marker: PhantomData,
        }
    }

    /// Bitmap with the given bit positions set.
    pub fn bitmap_of(positions: &[usize]) -> Result<Self> {
        let mut bitmap = Self::new();
        for &i in positions {
            bitmap.set(i)?;
        }
        Ok(bitmap)
    }
}

impl<W: Word> Default for Ewah<W, GrowableBuffer<W>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Word, B: Buffer<W>> Ewah<W, B> {
    /// Largest admissible bit index.
    pub const MAX_INDEX: usize = i32::MAX as usize - W::BITS as usize;

    pub(crate) fn from_parts(buffer: B, rlw_pos: usize, size_in_bits: usize) -> Self {
        Self {
            buffer,
            rlw_pos,
            size_in_bits,
            marker: PhantomData,
        }
    }

    /// Logical length in bits of the uncompressed bitmap this represents.
    pub fn size_in_bits(&self) -> usize {
        self.size_in_bits
    }

    /// Physical size of the compressed stream, in words.
    pub fn size_in_words(&self) -> usize {
        self.buffer.size_in_words()
    }

    pub(crate) fn open_header_position(&self) -> usize {
        self.rlw_pos
    }

    pub fn as_words(&self) -> &[W] {
        self.buffer.as_words()
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        let words = self.as_words();
        let mut cursor = RawCursor::new(words);
        while let Some(header) = cursor.next() {
            if header.run_bit() && header.run_len() > 0 {
                return false;
            }
            let start = cursor.literal_words_start();
            for k in 0..header.literal_count() {
                if words[start + k] != W::zero() {
                    return false;
                }
            }
        }
        true
    }

    /// Value of the `i`-th bit; false beyond the logical length.
    /// Linear in the compressed size; not meant for hot paths.
    pub fn get(&self, i: usize) -> bool {
        if i >= self.size_in_bits {
            return false;
        }
        let w = W::BITS as usize;
        let target = i / w;
        let words = self.as_words();
        let mut cursor = RawCursor::new(words);
        let mut n = 0;
        while let Some(header) = cursor.next() {
            let run = header.run_len();
            if target < n + run {
                return header.run_bit();
            }
            n += run;
            let literals = header.literal_count();
            if target < n + literals {
                let word = words[cursor.literal_words_start() + (target - n)];
                return (word >> (i % w)) & W::one() == W::one();
            }
            n += literals;
        }
        false
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> u64 {
        let words = self.as_words();
        let mut count = 0u64;
        let mut cursor = RawCursor::new(words);
        while let Some(header) = cursor.next() {
            if header.run_bit() {
                count += header.run_len() as u64 * W::BITS as u64;
            }
            let start = cursor.literal_words_start();
            for k in 0..header.literal_count() {
                count += words[start + k].count_ones() as u64;
            }
        }
        count
    }

    /// Maximal same-valued bit spans, in position order.
    pub fn chunks(&self) -> Chunks<'_, W> {
        Chunks::new(self.as_words(), self.size_in_bits)
    }

    /// Positions of the set bits, in increasing order.
    pub fn iter_ones(&self) -> OnesIter<'_, W> {
        OnesIter {
            chunks: self.chunks(),
            offset: 0,
            next_pos: 0,
            remaining: 0,
        }
    }

    pub fn positions(&self) -> Vec<usize> {
        self.iter_ones().collect()
    }

    /// Deep copy into an owned, growable bitmap.
    pub fn to_owned_bitmap(&self) -> Ewah<W, GrowableBuffer<W>> {
        Ewah::from_parts(
            GrowableBuffer::from_words(self.as_words()),
            self.rlw_pos,
            self.size_in_bits,
        )
    }

    fn merged<B2: Buffer<W>>(
        &self,
        other: &Ewah<W, B2>,
        op: fn(&[W], &[W], &mut Ewah<W, GrowableBuffer<W>>) -> SinkResult,
    ) -> Ewah<W, GrowableBuffer<W>> {
        let mut out =
            Ewah::with_word_capacity(self.size_in_words() + other.size_in_words());
        // the materializing sink never short-circuits
        let _ = op(self.as_words(), other.as_words(), &mut out);
        out.adjust_size_within_last_word(self.size_in_bits.max(other.size_in_bits));
        out
    }

    fn merged_cardinality<B2: Buffer<W>>(
        &self,
        other: &Ewah<W, B2>,
        op: fn(&[W], &[W], &mut BitCounter) -> SinkResult,
    ) -> u64 {
        let mut counter = BitCounter::new();
        let _ = op(self.as_words(), other.as_words(), &mut counter);
        counter.count()
    }

    pub fn and<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> Ewah<W, GrowableBuffer<W>> {
        self.merged(other, merge::and_into)
    }

    pub fn or<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> Ewah<W, GrowableBuffer<W>> {
        self.merged(other, merge::or_into)
    }

    pub fn xor<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> Ewah<W, GrowableBuffer<W>> {
        self.merged(other, merge::xor_into)
    }

    pub fn and_not<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> Ewah<W, GrowableBuffer<W>> {
        self.merged(other, merge::and_not_into)
    }

    /// Cardinality of `self & other` without materializing the result.
    pub fn and_cardinality<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> u64 {
        self.merged_cardinality(other, merge::and_into)
    }

    pub fn or_cardinality<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> u64 {
        self.merged_cardinality(other, merge::or_into)
    }

    pub fn xor_cardinality<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> u64 {
        self.merged_cardinality(other, merge::xor_into)
    }

    pub fn and_not_cardinality<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> u64 {
        self.merged_cardinality(other, merge::and_not_into)
    }

    /// True when `self & other` has at least one set bit. Runs only until
    /// the first common bit is found.
    pub fn intersects<B2: Buffer<W>>(&self, other: &Ewah<W, B2>) -> bool {
        merge::and_into(self.as_words(), other.as_words(), &mut NonEmptyProbe::new()).is_err()
    }

    /// Threshold-of-N over same-storage bitmaps: a bit of the result is set
    /// where at least `t` of the inputs have it set.
    pub fn threshold(t: usize, bitmaps: &[&Ewah<W, B>]) -> Ewah<W, GrowableBuffer<W>> {
        let streams: Vec<&[W]> = bitmaps.iter().map(|b| b.as_words()).collect();
        let mut out = Ewah::new();
        let _ = merge::threshold_into(t, &streams, &mut out);
        let size = bitmaps.iter().map(|b| b.size_in_bits).max().unwrap_or(0);
        out.adjust_size_within_last_word(size);
        out
    }

    /// Symmetric difference of N bitmaps.
    pub fn xor_multi(bitmaps: &[&Ewah<W, B>]) -> Ewah<W, GrowableBuffer<W>> {
        let streams: Vec<&[W]> = bitmaps.iter().map(|b| b.as_words()).collect();
        let mut out = Ewah::new();
        let _ = merge::xor_multi_into(&streams, &mut out);
        let size = bitmaps.iter().map(|b| b.size_in_bits).max().unwrap_or(0);
        out.adjust_size_within_last_word(size);
        out
    }

    /// Positional mask: bit `p` of the result is set when bit `p` of `self`
    /// is set and bit `rank(p)` of `that` is set, where `rank(p)` counts the
    /// set bits of `self` below `p`. The result has `self`'s bit length.
    pub fn compose<B2: Buffer<W>>(&self, that: &Ewah<W, B2>) -> Ewah<W, GrowableBuffer<W>> {
        let mut result = Ewah::new();
        let mut index = 0;
        let mut a = self.chunks();
        let mut b = that.chunks();
        while let Some(chunk) = a.peek() {
            if !chunk.bit {
                index += chunk.len;
                result.extend_to(index, false);
                a.advance(chunk.len);
            } else {
                let Some(mask) = b.peek() else { break };
                let len = chunk.len.min(mask.len);
                index += len;
                result.extend_to(index, mask.bit);
                a.advance(len);
                b.advance(len);
            }
        }
        result.extend_to(self.size_in_bits, false);
        result
    }

    /// New bitmap with every set bit moved up by `n` positions.
    pub fn shift(&self, n: usize) -> Result<Ewah<W, GrowableBuffer<W>>> {
        let total = self.size_in_bits + n;
        if total > Self::MAX_INDEX + 1 {
            return Err(Error::IndexOutOfBounds {
                index: total,
                max: Self::MAX_INDEX,
            });
        }
        let w = W::BITS as usize;
        let mut out = Ewah::with_word_capacity(self.size_in_words() + n / w + 1);
        out.push_empty_words(false, n / w);
        let s = n % w;
        let words = self.as_words();
        let mut cursor = RawCursor::new(words);
        if s == 0 {
            while let Some(header) = cursor.next() {
                out.push_empty_words(header.run_bit(), header.run_len());
                let start = cursor.literal_words_start();
                out.push_literal_words(&words[start..start + header.literal_count()]);
            }
        } else {
            // running carry of the high `s` bits of the previous input word
            let mut carry = W::zero();
            while let Some(header) = cursor.next() {
                let run = header.run_len();
                if run > 0 {
                    if header.run_bit() {
                        out.push_word(carry | (W::ones() << s));
                        out.push_empty_words(true, run - 1);
                        carry = W::ones() >> (w - s);
                    } else {
                        out.push_word(carry);
                        out.push_empty_words(false, run - 1);
                        carry = W::zero();
                    }
                }
                let start = cursor.literal_words_start();
                for k in 0..header.literal_count() {
                    let x = words[start + k];
                    out.push_word(carry | (x << s));
                    carry = x >> (w - s);
                }
            }
            if out.size_in_bits < total {
                out.push_word(carry);
            }
        }
        out.adjust_size_within_last_word(total);
        Ok(out)
    }

    /// Fixed-layout binary serialization (§ wire format in the crate docs).
    pub fn serialize(&self, out: &mut impl std::io::Write) -> Result<()> {
        crate::serialize::write_to(self, out)
    }

    /// Number of bytes `serialize` will produce.
    pub fn serialized_size_in_bytes(&self) -> usize {
        12 + self.size_in_words() * core::mem::size_of::<W>()
    }
}

// Mutating API; only the growable variant supports it. A zero-copy view
// must be converted with `to_owned_bitmap` first.
impl<W: Word> Ewah<W, GrowableBuffer<W>> {
    fn rlw(&self) -> W {
        self.buffer.word(self.rlw_pos)
    }

    fn set_rlw(&mut self, header: W) {
        self.buffer.set_word(self.rlw_pos, header);
    }

    /// Append one uncompressed word: uniform words fold into the open run,
    /// anything else is stored verbatim.
    pub fn push_word(&mut self, w: W) {
        if w == W::zero() {
            self.push_empty_words(false, 1);
        } else if w == W::ones() {
            self.push_empty_words(true, 1);
        } else {
            self.push_literal_word(w);
        }
    }

    /// Append `n` words whose every bit equals `bit`.
    pub fn push_empty_words(&mut self, bit: bool, mut n: usize) {
        if n == 0 {
            return;
        }
        self.size_in_bits += n * W::BITS as usize;
        let mut header = self.rlw();
        if header.literal_count() == 0 && header.run_len() == 0 && header.run_bit() != bit {
            // an empty open header adopts the run bit
            header = header.with_run_bit(bit);
            self.set_rlw(header);
        }
        if header.literal_count() == 0 && header.run_bit() == bit {
            let run = header.run_len();
            let take = n.min(W::MAX_RUN as usize - run);
            self.set_rlw(header.with_run_len(run + take));
            n -= take;
        }
        while n > 0 {
            self.buffer.push_word(W::zero());
            self.rlw_pos = self.buffer.size_in_words() - 1;
            let take = n.min(W::MAX_RUN as usize);
            self.set_rlw(W::header(bit, take, 0));
            n -= take;
        }
    }

    /// Append one word verbatim.
    pub fn push_literal_word(&mut self, w: W) {
        self.size_in_bits += W::BITS as usize;
        let header = self.rlw();
        let literals = header.literal_count();
        if literals as u64 >= W::MAX_LITERAL {
            self.buffer.push_word(W::zero());
            self.rlw_pos = self.buffer.size_in_words() - 1;
            self.set_rlw(W::zero().with_literal_count(1));
        } else {
            self.set_rlw(header.with_literal_count(literals + 1));
        }
        self.buffer.push_word(w);
    }

    /// Append a run of verbatim words.
    pub fn push_literal_words(&mut self, words: &[W]) {
        let mut rest = words;
        while !rest.is_empty() {
            let header = self.rlw();
            let literals = header.literal_count();
            let room = (W::MAX_LITERAL as usize) - literals;
            if room == 0 {
                self.buffer.push_word(W::zero());
                self.rlw_pos = self.buffer.size_in_words() - 1;
                continue;
            }
            let take = rest.len().min(room);
            self.set_rlw(header.with_literal_count(literals + take));
            self.buffer.push_words(&rest[..take]);
            self.size_in_bits += take * W::BITS as usize;
            rest = &rest[take..];
        }
    }

    /// Set bit `i` to 1. O(1) amortized when appending monotonically;
    /// otherwise linear in the compressed size, splicing runs apart as
    /// needed.
    pub fn set(&mut self, i: usize) -> Result<()> {
        self.set_bit(i, true)
    }

    /// Set bit `i` to 0.
    pub fn clear_bit(&mut self, i: usize) -> Result<()> {
        self.set_bit(i, false)
    }

    fn set_bit(&mut self, i: usize, value: bool) -> Result<()> {
        if i > Self::MAX_INDEX {
            return Err(Error::IndexOutOfBounds {
                index: i,
                max: Self::MAX_INDEX,
            });
        }
        if i < self.size_in_bits {
            self.mutate_in_place(i, value);
            return Ok(());
        }
        if !value {
            // clearing past the end only extends the logical length
            self.extend_to(i + 1, false);
            return Ok(());
        }
        let w = W::BITS as usize;
        let target = i / w;
        let current_words = self.size_in_bits.div_ceil(w);
        if target >= current_words {
            self.extend_to(target * w, false);
            self.push_literal_word(W::one() << (i % w));
            self.size_in_bits = i + 1;
        } else {
            // the bit falls in the existing final word
            self.size_in_bits = i + 1;
            self.or_into_last_word(W::one() << (i % w));
        }
        Ok(())
    }

    // The general random-access path: scan headers to the chunk containing
    // word `i / BITS`, then flip a bit in a literal or splice the run.
    fn mutate_in_place(&mut self, i: usize, value: bool) {
        let w = W::BITS as usize;
        let target = i / w;
        let bit = i % w;
        let mut pos = 0;
        let mut n = 0;
        while pos < self.buffer.size_in_words() {
            let header = self.buffer.word(pos);
            let run = header.run_len();
            let literals = header.literal_count();
            if target < n + run {
                if header.run_bit() != value {
                    self.split_run(pos, target - n, bit, value);
                }
                return;
            }
            if target < n + run + literals {
                let literal_pos = pos + 1 + (target - n - run);
                let old = self.buffer.word(literal_pos);
                let new = if value {
                    old | (W::one() << bit)
                } else {
                    old & !(W::one() << bit)
                };
                if new != old {
                    self.buffer.set_word(literal_pos, new);
                    self.try_fold_literal_into_run(pos, literal_pos, new);
                }
                return;
            }
            n += run + literals;
            pos += 1 + literals;
        }
        debug_assert!(false, "bit {i} within size_in_bits but not under any header");
    }

    // A mutated literal that became uniform can merge into the adjoining
    // run when it is the first literal of its header and the run matches.
    fn try_fold_literal_into_run(&mut self, pos: usize, literal_pos: usize, word: W) {
        let uniform = if word == W::zero() {
            false
        } else if word == W::ones() {
            true
        } else {
            return;
        };
        let header = self.buffer.word(pos);
        if literal_pos != pos + 1 {
            return;
        }
        let run = header.run_len();
        if (run > 0 && header.run_bit() != uniform) || run as u64 >= W::MAX_RUN {
            return;
        }
        self.buffer.set_word(
            pos,
            header
                .with_run_bit(uniform)
                .with_run_len(run + 1)
                .with_literal_count(header.literal_count() - 1),
        );
        self.buffer.collapse(literal_pos, 1);
        if self.rlw_pos > pos {
            self.rlw_pos -= 1;
        }
    }

    // Split the run under `pos` around its `k`-th word, which becomes a
    // literal with bit `bit` flipped to `value`.
    fn split_run(&mut self, pos: usize, k: usize, bit: usize, value: bool) {
        let header = self.buffer.word(pos);
        let b = header.run_bit();
        let run = header.run_len();
        let literals = header.literal_count();
        debug_assert!(k < run && b != value);
        let literal = if value {
            W::one() << bit
        } else {
            W::ones() & !(W::one() << bit)
        };
        if k == run - 1 && (literals as u64) < W::MAX_LITERAL {
            // the mutated word becomes the first literal of this header
            self.buffer.expand(pos + 1, 1);
            self.buffer.set_word(pos + 1, literal);
            self.buffer
                .set_word(pos, header.with_run_len(run - 1).with_literal_count(literals + 1));
            if self.rlw_pos > pos {
                self.rlw_pos += 1;
            }
        } else {
            // head run + one literal; the tail header keeps the remainder
            // of the run and the original literals
            self.buffer.expand(pos + 1, 2);
            self.buffer.set_word(pos, W::header(b, k, 1));
            self.buffer.set_word(pos + 1, literal);
            self.buffer.set_word(pos + 2, W::header(b, run - k - 1, literals));
            if self.rlw_pos > pos {
                self.rlw_pos += 2;
            } else if self.rlw_pos == pos {
                self.rlw_pos = pos + 2;
            }
        }
    }

    // OR a mask into the final logical word, leaving the logical length
    // unchanged. The caller guarantees the mask only covers bits inside
    // the logical length.
    fn or_into_last_word(&mut self, mask: W) {
        let size = self.size_in_bits;
        let header = self.rlw();
        if header.literal_count() > 0 {
            let last = self.buffer.size_in_words() - 1;
            let word = self.buffer.word(last) | mask;
            self.buffer.set_word(last, word);
            if word == W::ones() {
                // completed a uniform word: fold it into a run
                self.buffer.remove_last();
                self.set_rlw(header.with_literal_count(header.literal_count() - 1));
                self.push_empty_words(true, 1);
            }
        } else if header.run_len() > 0 && !header.run_bit() {
            // replace the last word of the 0-run with a literal
            self.set_rlw(header.with_run_len(header.run_len() - 1));
            self.push_literal_word(mask);
        }
        // a trailing 1-run already has every bit set
        self.size_in_bits = size;
    }

    /// Grow to `bits`, padding with `bit`. Must not shrink.
    pub(crate) fn extend_to(&mut self, bits: usize, bit: bool) {
        debug_assert!(bits >= self.size_in_bits);
        if bits == self.size_in_bits {
            return;
        }
        let w = W::BITS as usize;
        let partial = self.size_in_bits % w;
        if partial != 0 {
            let word_end = self.size_in_bits + (w - partial);
            let upto = bits.min(word_end);
            if bit {
                let mask = W::low_mask((partial + (upto - self.size_in_bits)) as u32)
                    & !W::low_mask(partial as u32);
                self.or_into_last_word(mask);
            }
            self.size_in_bits = upto;
            if upto == bits {
                return;
            }
        }
        let full = (bits - self.size_in_bits) / w;
        if full > 0 {
            self.push_empty_words(bit, full);
        }
        let rest = bits - self.size_in_bits;
        if rest > 0 {
            if bit {
                self.push_literal_word(W::low_mask(rest as u32));
            } else {
                self.push_empty_words(false, 1);
            }
            self.size_in_bits = bits;
        }
    }

    /// General resize: grow to `bits`, padding with `default_bit`.
    pub fn set_size_in_bits(&mut self, bits: usize, default_bit: bool) -> Result<()> {
        if bits < self.size_in_bits {
            return Err(Error::InvalidResize {
                from: self.size_in_bits,
                to: bits,
            });
        }
        if bits > 0 && bits - 1 > Self::MAX_INDEX {
            return Err(Error::IndexOutOfBounds {
                index: bits - 1,
                max: Self::MAX_INDEX,
            });
        }
        self.extend_to(bits, default_bit);
        Ok(())
    }

    /// Resize entry point restricted to the final word: growth is always
    /// permitted (zero padded), shrinkage only within the current last word.
    pub fn set_size_within_last_word(&mut self, bits: usize) -> Result<()> {
        let w = W::BITS as usize;
        if bits >= self.size_in_bits {
            self.adjust_size_within_last_word(bits);
            Ok(())
        } else if bits.div_ceil(w) == self.size_in_bits.div_ceil(w) {
            self.size_in_bits = bits;
            self.mask_trailing();
            Ok(())
        } else {
            Err(Error::InvalidResize {
                from: self.size_in_bits,
                to: bits,
            })
        }
    }

    // Infallible variant used on freshly merged results, whose logical words
    // always cover the target length's final word.
    pub(crate) fn adjust_size_within_last_word(&mut self, bits: usize) {
        let w = W::BITS as usize;
        if bits >= self.size_in_bits {
            if bits.div_ceil(w) > self.size_in_bits.div_ceil(w) {
                self.extend_to(bits, false);
            } else {
                self.size_in_bits = bits;
            }
        } else {
            debug_assert!(bits.div_ceil(w) == self.size_in_bits.div_ceil(w));
            self.size_in_bits = bits;
            self.mask_trailing();
        }
    }

    // Clear any bits beyond size_in_bits in the final logical word. When
    // that word belongs to a 1-run, the run loses its last word and the
    // masked literal is appended through the normal append machinery; the
    // affected header is always the open header, so no rescan is needed.
    fn mask_trailing(&mut self) {
        let used = self.size_in_bits % W::BITS as usize;
        if used == 0 {
            return;
        }
        let mask = W::low_mask(used as u32);
        let header = self.rlw();
        if header.literal_count() > 0 {
            let last = self.buffer.size_in_words() - 1;
            self.buffer.set_word(last, self.buffer.word(last) & mask);
        } else if header.run_len() > 0 && header.run_bit() {
            self.set_rlw(header.with_run_len(header.run_len() - 1));
            let size = self.size_in_bits;
            self.push_literal_word(mask);
            self.size_in_bits = size;
        }
    }

    /// In-place complement of every bit up to `size_in_bits`.
    pub fn not(&mut self) {
        let mut pos = 0;
        loop {
            let header = self.buffer.word(pos);
            let literals = header.literal_count();
            self.buffer
                .set_word(pos, header.with_run_bit(!header.run_bit()));
            for k in 0..literals {
                let literal_pos = pos + 1 + k;
                self.buffer
                    .set_word(literal_pos, !self.buffer.word(literal_pos));
            }
            pos += 1 + literals;
            if pos >= self.buffer.size_in_words() {
                break;
            }
        }
        self.mask_trailing();
    }

    /// Reset to the empty bitmap, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.rlw_pos = 0;
        self.size_in_bits = 0;
    }

    /// Exchange contents with another bitmap.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Release unused buffer capacity.
    pub fn trim(&mut self) {
        self.buffer.trim();
    }

    /// Read the wire format back into an owned bitmap.
    pub fn deserialize(input: &mut impl std::io::Read) -> Result<Self> {
        crate::serialize::read_from(input)
    }
}

impl<'a, W: Word> Ewah<W, ViewBuffer<'a, W>> {
    /// Zero-copy deserialization: reinterprets the word payload of a
    /// serialized bitmap in place. The byte region must stay alive and
    /// unmodified for the life of the view.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        crate::serialize::view_from_bytes(bytes)
    }
}

// Bit-content equality, short-circuiting at the first differing bit.
impl<W: Word, B1: Buffer<W>, B2: Buffer<W>> PartialEq<Ewah<W, B2>> for Ewah<W, B1> {
    fn eq(&self, other: &Ewah<W, B2>) -> bool {
        merge::xor_into(self.as_words(), other.as_words(), &mut NonEmptyProbe::new()).is_ok()
    }
}

// The facade is itself a merge sink; it materializes the produced stream.
impl<W: Word> Sink<W> for Ewah<W, GrowableBuffer<W>> {
    fn add_literal_word(&mut self, w: W) -> SinkResult {
        self.push_literal_word(w);
        Ok(())
    }

    fn add_literal_words(&mut self, words: &[W]) -> SinkResult {
        self.push_literal_words(words);
        Ok(())
    }

    fn add_negated_literal_words(&mut self, words: &[W]) -> SinkResult {
        for &w in words {
            self.push_word(!w);
        }
        Ok(())
    }

    fn add_empty_words(&mut self, bit: bool, n: usize) -> SinkResult {
        self.push_empty_words(bit, n);
        Ok(())
    }

    fn set_size_within_last_word(&mut self, bits: usize) -> SinkResult {
        self.adjust_size_within_last_word(bits);
        Ok(())
    }

    fn clear(&mut self) {
        Ewah::clear(self);
    }
}

/// Iterator over set bit positions.
pub struct OnesIter<'a, W: Word> {
    chunks: Chunks<'a, W>,
    offset: usize,
    next_pos: usize,
    remaining: usize,
}

impl<'a, W: Word> Iterator for OnesIter<'a, W> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.remaining > 0 {
                let p = self.next_pos;
                self.next_pos += 1;
                self.remaining -= 1;
                return Some(p);
            }
            let chunk = self.chunks.next()?;
            if chunk.bit {
                self.next_pos = self.offset;
                self.remaining = chunk.len;
            }
            self.offset += chunk.len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(ones: &[usize]) -> Ewah64 {
        Ewah::bitmap_of(ones).unwrap()
    }

    // word-at-a-time reference for the combining operators
    fn naive_op(a: &[usize], b: &[usize], f: impl Fn(bool, bool) -> bool) -> Vec<usize> {
        let max = a.iter().chain(b).max().copied().unwrap_or(0) + 1;
        (0..max)
            .filter(|i| f(a.contains(i), b.contains(i)))
            .collect()
    }

    #[test]
    fn test_empty() {
        let bm = Ewah64::new();
        assert_eq!(bm.size_in_bits(), 0);
        assert_eq!(bm.size_in_words(), 1);
        assert!(bm.is_empty());
        assert_eq!(bm.cardinality(), 0);
        assert!(!bm.get(0));
        assert!(!bm.get(12345));
        assert!(bm.positions().is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let bm = bitmap(&[0, 2, 55, 64, 512]);
        for i in 0..600 {
            assert_eq!(bm.get(i), [0, 2, 55, 64, 512].contains(&i), "bit {i}");
        }
        assert_eq!(bm.cardinality(), 5);
        assert_eq!(bm.size_in_bits(), 513);
        assert_eq!(bm.positions(), vec![0, 2, 55, 64, 512]);
    }

    #[test]
    fn test_bitmap_of_unsorted_with_duplicates() {
        let bm = bitmap(&[5, 1, 200, 1, 5]);
        assert_eq!(bm.positions(), vec![1, 5, 200]);
        assert_eq!(bm.cardinality(), 3);
    }

    #[test]
    fn test_word_boundary_bits() {
        let bm = bitmap(&[63, 64]);
        assert!(bm.get(63));
        assert!(bm.get(64));
        assert!(!bm.get(62));
        assert!(!bm.get(65));
        assert_eq!(bm.size_in_bits(), 65);
    }

    #[test]
    fn test_binary_ops() {
        let a = bitmap(&[0, 2, 55, 64, 512]);
        let b = bitmap(&[1, 3, 64, 512]);

        assert_eq!(a.and(&b).positions(), vec![64, 512]);
        assert_eq!(a.or(&b).positions(), vec![0, 1, 2, 3, 55, 64, 512]);
        assert_eq!(a.xor(&b).positions(), vec![0, 1, 2, 3, 55]);
        assert_eq!(a.and_not(&b).positions(), vec![0, 2, 55]);
        assert_eq!(b.and_not(&a).positions(), vec![1, 3]);

        assert_eq!(a.and_cardinality(&b), 2);
        assert_eq!(a.or_cardinality(&b), 7);
        assert_eq!(a.xor_cardinality(&b), 5);
        assert_eq!(a.and_not_cardinality(&b), 3);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&bitmap(&[5, 1000])));
        assert!(!a.intersects(&Ewah64::new()));
    }

    #[test]
    fn test_ops_preserve_larger_size() {
        let a = bitmap(&[1]);
        let b = bitmap(&[900]);
        assert_eq!(a.or(&b).size_in_bits(), 901);
        assert_eq!(a.and(&b).size_in_bits(), 901);
    }

    #[test]
    fn test_algebraic_laws() {
        let a = bitmap(&[0, 2, 55, 64, 512, 513, 514]);
        let b = bitmap(&[1, 3, 64, 300, 512]);

        assert_eq!(a.or(&a), a);
        assert_eq!(a.and(&a), a);
        assert!(a.xor(&a).is_empty());
        assert_eq!(a.and_not(&b), a.and(&{
            let mut nb = b.clone();
            nb.set_size_in_bits(a.size_in_bits(), false).unwrap();
            nb.not();
            nb
        }));

        // De Morgan over a common universe
        let n = 600;
        let mut na = a.clone();
        na.set_size_in_bits(n, false).unwrap();
        let mut nb = b.clone();
        nb.set_size_in_bits(n, false).unwrap();
        let mut lhs = na.or(&nb);
        lhs.not();
        na.not();
        nb.not();
        assert_eq!(lhs, na.and(&nb));

        assert_eq!(
            a.and_cardinality(&b) + a.and_not_cardinality(&b),
            a.cardinality()
        );
    }

    #[test]
    fn test_double_not_roundtrips() {
        let a = bitmap(&[0, 2, 55, 64, 512]);
        let mut twice = a.clone();
        twice.not();
        twice.not();
        assert_eq!(twice, a);
        assert_eq!(twice.size_in_bits(), a.size_in_bits());
    }

    #[test]
    fn test_not_masks_trailing_bits() {
        let mut bm = bitmap(&[1]);
        assert_eq!(bm.size_in_bits(), 2);
        bm.not();
        assert_eq!(bm.positions(), vec![0]);

        // trailing mask of a closing 1-run
        let mut run = Ewah64::new();
        run.set_size_in_bits(130, false).unwrap();
        run.not();
        assert_eq!(run.cardinality(), 130);
        assert!(run.get(129));
        assert!(!run.get(130));
    }

    #[test]
    fn test_clear_bit_splits_run() {
        let mut bm = Ewah64::new();
        for i in 0..256 {
            bm.set(i).unwrap();
        }
        assert_eq!(bm.size_in_words(), 1);
        bm.clear_bit(100).unwrap();
        assert!(!bm.get(100));
        assert!(bm.get(99));
        assert!(bm.get(101));
        assert_eq!(bm.cardinality(), 255);
    }

    #[test]
    fn test_set_inside_zero_run() {
        let mut bm = bitmap(&[1000]);
        bm.set(500).unwrap();
        assert!(bm.get(500));
        assert!(bm.get(1000));
        assert_eq!(bm.cardinality(), 2);
        bm.set(500).unwrap();
        assert_eq!(bm.cardinality(), 2);
    }

    #[test]
    fn test_completed_word_folds_into_run() {
        let mut bm = Ewah64::new();
        for i in 0..64 {
            bm.set(i).unwrap();
        }
        // a full word of ones compresses back to a single header
        assert_eq!(bm.size_in_words(), 1);
        assert_eq!(bm.cardinality(), 64);
    }

    #[test]
    fn test_in_place_fold_after_mutation() {
        let mut bm = Ewah64::new();
        for i in 0..256 {
            bm.set(i).unwrap();
        }
        bm.set(5000).unwrap();
        bm.clear_bit(100).unwrap();
        let words_split = bm.size_in_words();
        bm.set(100).unwrap();
        assert!(bm.size_in_words() < words_split);
        assert_eq!(bm.cardinality(), 257);
    }

    #[test]
    fn test_set_size_with_default_bit() {
        let mut bm = bitmap(&[0]);
        bm.set_size_in_bits(200, true).unwrap();
        assert_eq!(bm.size_in_bits(), 200);
        assert_eq!(bm.cardinality(), 200);
        assert!(bm.get(199));
        assert!(!bm.get(200));
        assert!(bm.set_size_in_bits(100, false).is_err());
    }

    #[test]
    fn test_set_size_within_last_word() {
        let mut bm = Ewah64::new();
        for i in 0..64 {
            bm.set(i).unwrap();
        }
        bm.set_size_within_last_word(60).unwrap();
        assert_eq!(bm.cardinality(), 60);
        assert_eq!(bm.size_in_bits(), 60);

        let mut run = Ewah64::new();
        for i in 0..128 {
            run.set(i).unwrap();
        }
        run.set_size_within_last_word(100).unwrap();
        assert_eq!(run.cardinality(), 100);

        let mut tall = bitmap(&[64]);
        assert!(tall.set_size_within_last_word(60).is_err());
    }

    #[test]
    fn test_shift() {
        let ones = [0usize, 2, 55, 64, 512];
        let bm = bitmap(&ones);
        for n in [0usize, 1, 63, 64, 67, 130] {
            let shifted = bm.shift(n).unwrap();
            let expected: Vec<usize> = ones.iter().map(|&i| i + n).collect();
            assert_eq!(shifted.positions(), expected, "shift by {n}");
            assert_eq!(shifted.size_in_bits(), bm.size_in_bits() + n);
        }
    }

    #[test]
    fn test_shift_empty() {
        let shifted = Ewah64::new().shift(70).unwrap();
        assert!(shifted.is_empty());
        assert_eq!(shifted.size_in_bits(), 70);
    }

    #[test]
    fn test_shift_dense_run() {
        let mut bm = Ewah64::new();
        for i in 0..200 {
            bm.set(i).unwrap();
        }
        let shifted = bm.shift(3).unwrap();
        assert_eq!(shifted.cardinality(), 200);
        assert!(!shifted.get(2));
        assert!(shifted.get(3));
        assert!(shifted.get(202));
        assert!(!shifted.get(203));
    }

    #[test]
    fn test_compose() {
        // the n-th set bit of the left operand survives when bit n of the
        // right operand is set
        let a = bitmap(&[2, 3, 7, 9]);
        let selector = bitmap(&[0, 2, 3]);
        let composed = a.compose(&selector);
        assert_eq!(composed.positions(), vec![2, 7, 9]);
        assert_eq!(composed.size_in_bits(), a.size_in_bits());

        assert!(a.compose(&Ewah64::new()).is_empty());
    }

    #[test]
    fn test_threshold_majority() {
        let a = bitmap(&[1, 2, 3, 400]);
        let b = bitmap(&[2, 3, 5, 400]);
        let c = bitmap(&[3, 5, 9]);
        let inputs = [&a, &b, &c];
        assert_eq!(Ewah::threshold(1, &inputs), a.or(&b).or(&c));
        assert_eq!(Ewah::threshold(2, &inputs).positions(), vec![2, 3, 5, 400]);
        assert_eq!(Ewah::threshold(3, &inputs).positions(), vec![3]);
        assert!(Ewah::threshold(4, &inputs).is_empty());
    }

    #[test]
    fn test_xor_multi_parity() {
        let a = bitmap(&[1, 2, 3, 400]);
        let b = bitmap(&[2, 3, 5, 400]);
        let c = bitmap(&[3, 5, 9]);
        let parity = Ewah::xor_multi(&[&a, &b, &c]);
        assert_eq!(parity, a.xor(&b).xor(&c));
        assert_eq!(parity.positions(), vec![1, 3, 9, 400]);
    }

    #[test]
    fn test_equality_is_bit_content() {
        let a = bitmap(&[1, 70]);
        let mut b = bitmap(&[1, 70]);
        b.set_size_in_bits(100_000, false).unwrap();
        // trailing zero padding does not affect equality
        assert_eq!(a, b);
        assert_ne!(a, bitmap(&[1, 71]));
    }

    #[test]
    fn test_index_bounds() {
        let mut bm = Ewah64::new();
        assert!(matches!(
            bm.set(Ewah64::MAX_INDEX + 1),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(bm.set(1_000_000).is_ok());
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut bm = bitmap(&[3, 900]);
        bm.clear();
        assert!(bm.is_empty());
        assert_eq!(bm.size_in_bits(), 0);
        bm.set(7).unwrap();
        assert_eq!(bm.positions(), vec![7]);

        let mut other = bitmap(&[5]);
        bm.swap(&mut other);
        assert_eq!(bm.positions(), vec![5]);
        assert_eq!(other.positions(), vec![7]);
    }

    #[test]
    fn test_push_word_compression() {
        let mut bm = Ewah64::new();
        bm.push_word(0);
        bm.push_word(0);
        bm.push_word(u64::MAX);
        bm.push_word(u64::MAX);
        bm.push_word(0b1010);
        // two runs and one literal: three headers at most
        assert!(bm.size_in_words() <= 4);
        assert_eq!(bm.size_in_bits(), 5 * 64);
        assert_eq!(bm.cardinality(), 128 + 2);
        assert!(bm.get(128));
        assert!(!bm.get(256));
        assert!(bm.get(257));
    }

    #[test]
    fn test_large_sequential_run() {
        let n = 11_000_000;
        let mut bm = Ewah64::new();
        for i in 0..n {
            bm.set(i).unwrap();
        }
        assert_eq!(bm.size_in_bits(), n);
        assert_eq!(bm.cardinality(), n as u64);
        // eleven million sequential bits collapse to a handful of words
        assert!(bm.size_in_words() < 4);
        assert!(bm.get(n - 1));
        assert!(!bm.get(n));
    }

    #[test]
    fn test_exhaustive_small_subsets() {
        use exhaustigen::Gen;

        let k = 10;
        let input: Vec<usize> = (0..k).collect();
        let fixed = bitmap(&[0, 3, 5, 9]);
        let mut gen = Gen::new();
        while !gen.done() {
            let ones: Vec<usize> = gen.gen_subset(&input).copied().collect();
            let bm = bitmap(&ones);
            assert_eq!(bm.cardinality() as usize, ones.len());
            assert_eq!(bm.positions(), ones);
            for i in 0..k + 2 {
                assert_eq!(bm.get(i), ones.contains(&i));
            }
            assert_eq!(
                bm.and(&fixed).positions(),
                naive_op(&ones, &[0, 3, 5, 9], |x, y| x && y)
            );
            assert_eq!(
                bm.or(&fixed).positions(),
                naive_op(&ones, &[0, 3, 5, 9], |x, y| x || y)
            );
            assert_eq!(
                bm.xor(&fixed).positions(),
                naive_op(&ones, &[0, 3, 5, 9], |x, y| x != y)
            );
        }
    }

    #[test]
    fn test_random_vs_naive() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let universe = 2048;
        for _ in 0..50 {
            let mut bm = Ewah64::new();
            let mut naive = vec![false; universe];
            for _ in 0..300 {
                let i = rng.gen_range(0..universe);
                if rng.gen_bool(0.7) {
                    bm.set(i).unwrap();
                    naive[i] = true;
                } else {
                    bm.clear_bit(i).unwrap();
                    naive[i] = false;
                }
            }
            let expected: Vec<usize> =
                (0..universe).filter(|&i| naive[i]).collect();
            assert_eq!(bm.positions(), expected);
            assert_eq!(bm.cardinality() as usize, expected.len());

            let mut other = Ewah64::new();
            let mut naive_other = vec![false; universe];
            for _ in 0..100 {
                let i = rng.gen_range(0..universe);
                other.set(i).unwrap();
                naive_other[i] = true;
            }
            let and: Vec<usize> = (0..universe)
                .filter(|&i| naive[i] && naive_other[i])
                .collect();
            let xor: Vec<usize> = (0..universe)
                .filter(|&i| naive[i] != naive_other[i])
                .collect();
            assert_eq!(bm.and(&other).positions(), and);
            assert_eq!(bm.xor(&other).positions(), xor);
            assert_eq!(bm.and_not(&other).and(&other).cardinality(), 0);
        }
    }

    #[test]
    fn test_u32_words() {
        let a: Ewah32 = Ewah::bitmap_of(&[0, 2, 31, 32, 512]).unwrap();
        let b: Ewah32 = Ewah::bitmap_of(&[1, 32, 512]).unwrap();
        assert_eq!(a.and(&b).positions(), vec![32, 512]);
        assert_eq!(a.or(&b).positions(), vec![0, 1, 2, 31, 32, 512]);
        assert_eq!(a.cardinality(), 5);
        let mut n = a.clone();
        n.not();
        n.not();
        assert_eq!(n, a);
        assert_eq!(a.shift(33).unwrap().positions(), vec![33, 35, 64, 65, 545]);
    }
}
