// Destinations for produced words. The bitmap facade is itself a sink and
// materializes a new compressed bitmap; `BitCounter` computes a cardinality
// without materializing anything; `NonEmptyProbe` ends the merge at the
// first nonzero word, which makes emptiness and equality checks run only
// until the first difference.

use crate::word::Word;

/// Short-circuit signal raised by a sink to end a merge early.
/// Zero-sized control flow, not an error; it never captures any context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop;

pub type SinkResult = core::result::Result<(), Stop>;

pub trait Sink<W: Word> {
    /// Append one uncompressed word, folding uniform words into runs.
    fn add_word(&mut self, w: W) -> SinkResult {
        if w == W::zero() {
            self.add_empty_words(false, 1)
        } else if w == W::ones() {
            self.add_empty_words(true, 1)
        } else {
            self.add_literal_word(w)
        }
    }

    /// Append one word verbatim, regardless of its content.
    fn add_literal_word(&mut self, w: W) -> SinkResult;

    /// Append a run of verbatim words.
    fn add_literal_words(&mut self, words: &[W]) -> SinkResult {
        for &w in words {
            self.add_literal_word(w)?;
        }
        Ok(())
    }

    /// Append the complement of each given word.
    fn add_negated_literal_words(&mut self, words: &[W]) -> SinkResult {
        for &w in words {
            self.add_word(!w)?;
        }
        Ok(())
    }

    /// Append `n` words whose every bit equals `bit`.
    fn add_empty_words(&mut self, bit: bool, n: usize) -> SinkResult;

    /// Adjust the logical bit length once a merge completes. Only the
    /// materializing sink has anything to do here.
    fn set_size_within_last_word(&mut self, _bits: usize) -> SinkResult {
        Ok(())
    }

    fn clear(&mut self);
}

/// Counts the 1-bits written to it and discards everything else. Used to
/// answer cardinality-of-result queries without building the result.
#[derive(Debug, Default)]
pub struct BitCounter {
    ones: u64,
}

impl BitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.ones
    }
}

impl<W: Word> Sink<W> for BitCounter {
    fn add_word(&mut self, w: W) -> SinkResult {
        self.ones += w.count_ones() as u64;
        Ok(())
    }

    fn add_literal_word(&mut self, w: W) -> SinkResult {
        self.ones += w.count_ones() as u64;
        Ok(())
    }

    fn add_negated_literal_words(&mut self, words: &[W]) -> SinkResult {
        for &w in words {
            self.ones += (W::BITS - w.count_ones()) as u64;
        }
        Ok(())
    }

    fn add_empty_words(&mut self, bit: bool, n: usize) -> SinkResult {
        if bit {
            self.ones += n as u64 * W::BITS as u64;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.ones = 0;
    }
}

/// Raises `Stop` the instant a nonzero word is about to be written.
#[derive(Debug, Default)]
pub struct NonEmptyProbe;

impl NonEmptyProbe {
    pub fn new() -> Self {
        Self
    }
}

impl<W: Word> Sink<W> for NonEmptyProbe {
    fn add_word(&mut self, w: W) -> SinkResult {
        if w == W::zero() {
            Ok(())
        } else {
            Err(Stop)
        }
    }

    fn add_literal_word(&mut self, w: W) -> SinkResult {
        // literal words are normally nonzero, but spliced streams may carry
        // uniform literals, so check rather than assume
        if w == W::zero() {
            Ok(())
        } else {
            Err(Stop)
        }
    }

    fn add_negated_literal_words(&mut self, words: &[W]) -> SinkResult {
        for &w in words {
            if w != W::ones() {
                return Err(Stop);
            }
        }
        Ok(())
    }

    fn add_empty_words(&mut self, bit: bool, n: usize) -> SinkResult {
        if bit && n > 0 {
            Err(Stop)
        } else {
            Ok(())
        }
    }

    fn clear(&mut self) {}
}

/// Test-only sink that materializes the uncompressed word stream.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct WordRecorder<W> {
    pub words: Vec<W>,
}

#[cfg(test)]
impl<W: Word> Sink<W> for WordRecorder<W> {
    fn add_literal_word(&mut self, w: W) -> SinkResult {
        self.words.push(w);
        Ok(())
    }

    fn add_empty_words(&mut self, bit: bool, n: usize) -> SinkResult {
        let w = if bit { W::ones() } else { W::zero() };
        self.words.extend(std::iter::repeat(w).take(n));
        Ok(())
    }

    fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let mut c = BitCounter::new();
        Sink::<u64>::add_empty_words(&mut c, true, 2).unwrap();
        Sink::<u64>::add_empty_words(&mut c, false, 5).unwrap();
        c.add_literal_word(0b1011u64).unwrap();
        c.add_negated_literal_words(&[!0b1u64]).unwrap();
        assert_eq!(c.count(), 128 + 3 + 1);
        Sink::<u64>::clear(&mut c);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_probe_stops_on_first_one() {
        let mut p = NonEmptyProbe::new();
        assert_eq!(Sink::<u64>::add_empty_words(&mut p, false, 10), Ok(()));
        assert_eq!(Sink::<u64>::add_empty_words(&mut p, true, 1), Err(Stop));
        assert_eq!(p.add_literal_word(0u64), Ok(()));
        assert_eq!(p.add_literal_word(4u64), Err(Stop));
        assert_eq!(p.add_negated_literal_words(&[u64::MAX]), Ok(()));
        assert_eq!(p.add_negated_literal_words(&[u64::MAX - 1]), Err(Stop));
    }
}
