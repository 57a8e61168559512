// Traversal of a compressed word stream. `RawCursor` walks header words in
// order; `BufferedCursor` layers a partially-consumable copy of the current
// header on top, which is the per-operand state of the merge engine: two
// streams with very different run lengths can be merged by discarding words
// from the front of one cursor without ever decompressing either stream.

use crate::sink::{Sink, SinkResult, Stop};
use crate::word::Word;

/// Walks the header words of a compressed stream in order.
pub struct RawCursor<'a, W> {
    words: &'a [W],
    pos: usize,
    lit_start: usize,
}

impl<'a, W: Word> RawCursor<'a, W> {
    pub fn new(words: &'a [W]) -> Self {
        Self {
            words,
            pos: 0,
            lit_start: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.words.len()
    }

    /// Decode the header at the current position and step past its literals.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<W> {
        if self.pos >= self.words.len() {
            return None;
        }
        let header = self.words[self.pos];
        self.lit_start = self.pos + 1;
        self.pos = self.lit_start + header.literal_count();
        Some(header)
    }

    /// Buffer offset of the literal run belonging to the header most
    /// recently returned by `next`.
    pub fn literal_words_start(&self) -> usize {
        self.lit_start
    }

    pub fn words(&self) -> &'a [W] {
        self.words
    }
}

/// A value copy of the current header plus the raw cursor used to refill it.
/// Words can be discarded from the front or discharged to a sink; the cursor
/// advances to the next header on its own when the current one is exhausted.
pub struct BufferedCursor<'a, W: Word> {
    raw: RawCursor<'a, W>,
    run_bit: bool,
    run_len: usize,
    literal_count: usize,
    literal_start: usize,
}

impl<'a, W: Word> BufferedCursor<'a, W> {
    pub fn new(words: &'a [W]) -> Self {
        let mut cursor = Self {
            raw: RawCursor::new(words),
            run_bit: false,
            run_len: 0,
            literal_count: 0,
            literal_start: 0,
        };
        cursor.refill();
        cursor
    }

    fn refill(&mut self) -> bool {
        match self.raw.next() {
            Some(header) => {
                self.run_bit = header.run_bit();
                self.run_len = header.run_len();
                self.literal_count = header.literal_count();
                self.literal_start = self.raw.literal_words_start();
                true
            }
            None => {
                self.run_len = 0;
                self.literal_count = 0;
                false
            }
        }
    }

    fn advance_if_exhausted(&mut self) {
        // loop: a well-formed stream only has an empty header at the end,
        // but spliced streams are walked the same way
        while self.size() == 0 && self.raw.has_next() {
            self.refill();
        }
    }

    /// Remaining logical words under the current header.
    pub fn size(&self) -> usize {
        self.run_len + self.literal_count
    }

    pub fn run_bit(&self) -> bool {
        self.run_bit
    }

    pub fn run_len(&self) -> usize {
        self.run_len
    }

    pub fn literal_count(&self) -> usize {
        self.literal_count
    }

    /// The k-th not-yet-consumed literal word of the current header.
    pub fn literal_word(&self, k: usize) -> W {
        debug_assert!(k < self.literal_count);
        self.raw.words()[self.literal_start + k]
    }

    pub fn literal_words(&self) -> &'a [W] {
        &self.raw.words()[self.literal_start..self.literal_start + self.literal_count]
    }

    /// Zero out the pending run, keeping the literals.
    pub fn discard_run(&mut self) {
        self.run_len = 0;
        self.advance_if_exhausted();
    }

    /// Consume `k` literal words from the front.
    pub fn discard_literals(&mut self, k: usize) {
        debug_assert!(k <= self.literal_count);
        self.literal_start += k;
        self.literal_count -= k;
        self.advance_if_exhausted();
    }

    /// Consume `n` logical words from the front, depleting the run first,
    /// then the literals, refilling from the next header as needed.
    pub fn discard_first_words(&mut self, mut n: usize) {
        while n > 0 && self.size() > 0 {
            let from_run = n.min(self.run_len);
            self.run_len -= from_run;
            n -= from_run;
            let from_literals = n.min(self.literal_count);
            self.literal_start += from_literals;
            self.literal_count -= from_literals;
            n -= from_literals;
            self.advance_if_exhausted();
        }
    }

    /// Write up to `max` pending words to `sink`, consuming them.
    /// Returns the number of words written.
    pub fn discharge<S: Sink<W> + ?Sized>(
        &mut self,
        sink: &mut S,
        max: usize,
    ) -> Result<usize, Stop> {
        self.discharge_words(sink, max, false)
    }

    /// Like `discharge`, but emits the complement of every word.
    pub fn discharge_negated<S: Sink<W> + ?Sized>(
        &mut self,
        sink: &mut S,
        max: usize,
    ) -> Result<usize, Stop> {
        self.discharge_words(sink, max, true)
    }

    /// Emit all remaining words to `sink`.
    pub fn discharge_all<S: Sink<W> + ?Sized>(&mut self, sink: &mut S) -> SinkResult {
        self.discharge_words(sink, usize::MAX, false).map(|_| ())
    }

    fn discharge_words<S: Sink<W> + ?Sized>(
        &mut self,
        sink: &mut S,
        max: usize,
        negated: bool,
    ) -> Result<usize, Stop> {
        let mut written = 0;
        while written < max && self.size() > 0 {
            let run = self.run_len.min(max - written);
            if run > 0 {
                sink.add_empty_words(self.run_bit ^ negated, run)?;
                self.run_len -= run;
                written += run;
            }
            let literals = self.literal_count.min(max - written);
            if literals > 0 {
                let words = &self.raw.words()[self.literal_start..self.literal_start + literals];
                if negated {
                    sink.add_negated_literal_words(words)?;
                } else {
                    sink.add_literal_words(words)?;
                }
                self.literal_start += literals;
                self.literal_count -= literals;
                written += literals;
            }
            self.advance_if_exhausted();
        }
        Ok(written)
    }
}
