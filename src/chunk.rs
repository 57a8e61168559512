// Iteration over same-valued bit spans. This is a different traversal from
// the header walk: runs and literal words are coalesced on demand into
// maximal spans of identical bits, which is what `compose` and positional
// iteration want.

use crate::cursor::BufferedCursor;
use crate::word::Word;

/// A maximal span of identical bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub bit: bool,
    pub len: usize,
}

/// Pulls primitive equal-bit spans out of the compressed stream: whole runs,
/// and bit-runs decomposed from the low end of each literal word.
struct SpanSource<'a, W: Word> {
    cursor: BufferedCursor<'a, W>,
    literal: W,
    literal_bits: u32,
}

impl<'a, W: Word> SpanSource<'a, W> {
    fn new(words: &'a [W]) -> Self {
        Self {
            cursor: BufferedCursor::new(words),
            literal: W::zero(),
            literal_bits: 0,
        }
    }

    fn next_span(&mut self) -> Option<(bool, usize)> {
        loop {
            if self.literal_bits > 0 {
                let bit = self.literal & W::one() == W::one();
                let same = if bit {
                    (!self.literal).trailing_zeros()
                } else {
                    self.literal.trailing_zeros()
                };
                let n = same.min(self.literal_bits);
                self.literal = if n == self.literal_bits {
                    W::zero()
                } else {
                    self.literal >> (n as usize)
                };
                self.literal_bits -= n;
                return Some((bit, n as usize));
            }
            if self.cursor.size() == 0 {
                return None;
            }
            if self.cursor.run_len() > 0 {
                let bit = self.cursor.run_bit();
                let words = self.cursor.run_len();
                self.cursor.discard_first_words(words);
                return Some((bit, words * W::BITS as usize));
            }
            self.literal = self.cursor.literal_word(0);
            self.literal_bits = W::BITS;
            self.cursor.discard_first_words(1);
        }
    }
}

/// Iterator over maximal same-valued bit spans of a bitmap, truncated to its
/// logical bit length. Supports partial consumption through `peek`/`advance`.
pub struct Chunks<'a, W: Word> {
    source: SpanSource<'a, W>,
    pending: Option<(bool, usize)>,
    lookahead: Option<(bool, usize)>,
    bits_left: usize,
}

impl<'a, W: Word> Chunks<'a, W> {
    pub(crate) fn new(words: &'a [W], size_in_bits: usize) -> Self {
        Self {
            source: SpanSource::new(words),
            pending: None,
            lookahead: None,
            bits_left: size_in_bits,
        }
    }

    fn fill(&mut self) {
        if self.pending.is_some() || self.bits_left == 0 {
            return;
        }
        let first = self.lookahead.take().or_else(|| self.source.next_span());
        let Some((bit, mut len)) = first else { return };
        // coalesce consecutive spans of the same bit
        loop {
            match self.source.next_span() {
                Some((b, l)) if b == bit => len += l,
                Some(other) => {
                    self.lookahead = Some(other);
                    break;
                }
                None => break,
            }
        }
        self.pending = Some((bit, len.min(self.bits_left)));
    }

    /// The current chunk, without consuming it.
    pub fn peek(&mut self) -> Option<Chunk> {
        self.fill();
        self.pending.map(|(bit, len)| Chunk { bit, len })
    }

    /// Consume `n` bits of the current chunk. `n` must not exceed its length.
    pub fn advance(&mut self, n: usize) {
        if let Some((bit, len)) = self.pending {
            debug_assert!(n <= len);
            self.bits_left -= n;
            self.pending = if n == len { None } else { Some((bit, len - n)) };
        }
    }
}

impl<'a, W: Word> Iterator for Chunks<'a, W> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let chunk = self.peek()?;
        self.advance(chunk.len);
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesces_runs_and_literals() {
        // 0-run of 64 bits, then literal 0b0111 (3 ones, 61 zeros),
        // then 1-run of 128 bits
        let words = vec![
            u64::header(false, 1, 1),
            0b0111,
            u64::header(true, 2, 0),
        ];
        let chunks: Vec<Chunk> = Chunks::new(&words, 256).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { bit: false, len: 64 },
                Chunk { bit: true, len: 3 },
                Chunk { bit: false, len: 61 },
                Chunk { bit: true, len: 128 },
            ]
        );
    }

    #[test]
    fn test_coalesces_across_word_boundary() {
        // literal ending in ones followed by a 1-run: one chunk
        let words = vec![u64::header(false, 0, 1), !0u64 << 10, u64::header(true, 1, 0)];
        let chunks: Vec<Chunk> = Chunks::new(&words, 128).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { bit: false, len: 10 },
                Chunk { bit: true, len: 54 + 64 },
            ]
        );
    }

    #[test]
    fn test_truncates_to_size() {
        let words = vec![u64::header(true, 1, 0)];
        let chunks: Vec<Chunk> = Chunks::new(&words, 10).collect();
        assert_eq!(chunks, vec![Chunk { bit: true, len: 10 }]);
    }

    #[test]
    fn test_partial_advance() {
        let words = vec![u64::header(true, 1, 0)];
        let mut chunks = Chunks::new(&words, 64);
        assert_eq!(chunks.peek(), Some(Chunk { bit: true, len: 64 }));
        chunks.advance(20);
        assert_eq!(chunks.peek(), Some(Chunk { bit: true, len: 44 }));
        chunks.advance(44);
        assert_eq!(chunks.peek(), None);
    }

    #[test]
    fn test_empty() {
        let words = vec![0u64];
        assert_eq!(Chunks::new(&words, 0).next(), None);
    }
}
