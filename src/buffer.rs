// Word storage behind a compressed bitmap: either a growable append-only
// vector, or a fixed read-only view over caller-owned words (for example a
// memory-mapped serialized bitmap). The view variant implements `Buffer`
// only; every mutating entry point on the facade requires `BufferMut`, so
// attempts to grow a view are ruled out at compile time rather than at run
// time.

use crate::word::Word;

/// Read access to a contiguous sequence of words.
pub trait Buffer<W: Word> {
    fn size_in_words(&self) -> usize;

    fn word(&self, i: usize) -> W;

    fn as_words(&self) -> &[W];
}

/// Mutation methods used by the append and bit-splice paths.
pub trait BufferMut<W: Word>: Buffer<W> {
    fn set_word(&mut self, i: usize, w: W);

    fn push_word(&mut self, w: W);

    fn push_words(&mut self, words: &[W]);

    fn remove_last(&mut self);

    /// Insert `len` zero words at `pos`, shifting the tail up.
    fn expand(&mut self, pos: usize, len: usize);

    /// Remove `len` words at `pos`, shifting the tail down.
    fn collapse(&mut self, pos: usize, len: usize);

    /// Reset to the initial state: a single zero word (an empty open header).
    fn clear(&mut self);

    /// Release unused capacity.
    fn trim(&mut self);
}

const INITIAL_CAPACITY: usize = 4;

// Below this many words the buffer doubles on growth; beyond it, grows by 3/2.
const DOUBLING_LIMIT: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub struct GrowableBuffer<W> {
    words: Vec<W>,
}

impl<W: Word> GrowableBuffer<W> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut words = Vec::with_capacity(capacity.max(1));
        // The buffer always holds at least one word: the initial open header.
        words.push(W::zero());
        Self { words }
    }

    pub fn from_words(words: &[W]) -> Self {
        if words.is_empty() {
            return Self::new();
        }
        Self {
            words: words.to_vec(),
        }
    }

    fn reserve_for(&mut self, additional: usize) {
        let needed = self.words.len().saturating_add(additional);
        if needed <= self.words.capacity() {
            return;
        }
        let mut capacity = self.words.capacity().max(INITIAL_CAPACITY);
        while capacity < needed {
            capacity = if capacity < DOUBLING_LIMIT {
                capacity.saturating_mul(2)
            } else {
                capacity.saturating_add(capacity / 2)
            };
        }
        self.words.reserve_exact(capacity - self.words.len());
    }
}

impl<W: Word> Default for GrowableBuffer<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Word> Buffer<W> for GrowableBuffer<W> {
    fn size_in_words(&self) -> usize {
        self.words.len()
    }

    fn word(&self, i: usize) -> W {
        self.words[i]
    }

    fn as_words(&self) -> &[W] {
        &self.words
    }
}

impl<W: Word> BufferMut<W> for GrowableBuffer<W> {
    fn set_word(&mut self, i: usize, w: W) {
        self.words[i] = w;
    }

    fn push_word(&mut self, w: W) {
        self.reserve_for(1);
        self.words.push(w);
    }

    fn push_words(&mut self, words: &[W]) {
        self.reserve_for(words.len());
        self.words.extend_from_slice(words);
    }

    fn remove_last(&mut self) {
        self.words.pop();
    }

    fn expand(&mut self, pos: usize, len: usize) {
        let old = self.words.len();
        self.reserve_for(len);
        self.words.resize(old + len, W::zero());
        self.words.copy_within(pos..old, pos + len);
        for w in &mut self.words[pos..pos + len] {
            *w = W::zero();
        }
    }

    fn collapse(&mut self, pos: usize, len: usize) {
        self.words.copy_within(pos + len.., pos);
        self.words.truncate(self.words.len() - len);
    }

    fn clear(&mut self) {
        self.words.clear();
        self.words.push(W::zero());
    }

    fn trim(&mut self) {
        self.words.shrink_to_fit();
    }
}

/// A fixed read-only view over caller-owned words. The backing region must
/// outlive every cursor and bitmap built over it, and must not be mutated
/// concurrently with reads; both are enforced by the `'a` borrow.
#[derive(Debug, Clone, Copy)]
pub struct ViewBuffer<'a, W> {
    words: &'a [W],
}

impl<'a, W: Word> ViewBuffer<'a, W> {
    pub fn new(words: &'a [W]) -> Self {
        Self { words }
    }
}

impl<'a, W: Word> Buffer<W> for ViewBuffer<'a, W> {
    fn size_in_words(&self) -> usize {
        self.words.len()
    }

    fn word(&self, i: usize) -> W {
        self.words[i]
    }

    fn as_words(&self) -> &[W] {
        self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_one_zero_word() {
        let b = GrowableBuffer::<u64>::new();
        assert_eq!(b.size_in_words(), 1);
        assert_eq!(b.word(0), 0);
    }

    #[test]
    fn test_push_and_get() {
        let mut b = GrowableBuffer::<u64>::new();
        for i in 0..100u64 {
            b.push_word(i);
        }
        assert_eq!(b.size_in_words(), 101);
        assert_eq!(b.word(100), 99);
        b.remove_last();
        assert_eq!(b.size_in_words(), 100);
    }

    #[test]
    fn test_expand_shifts_tail() {
        let mut b = GrowableBuffer::<u64>::from_words(&[1, 2, 3, 4]);
        b.expand(1, 2);
        assert_eq!(b.as_words(), &[1, 0, 0, 2, 3, 4]);
        b.set_word(1, 9);
        b.set_word(2, 8);
        assert_eq!(b.as_words(), &[1, 9, 8, 2, 3, 4]);
    }

    #[test]
    fn test_collapse_shifts_tail() {
        let mut b = GrowableBuffer::<u64>::from_words(&[1, 2, 3, 4, 5]);
        b.collapse(1, 3);
        assert_eq!(b.as_words(), &[1, 5]);
        b.collapse(1, 1);
        assert_eq!(b.as_words(), &[1]);
    }

    #[test]
    fn test_expand_at_end() {
        let mut b = GrowableBuffer::<u64>::from_words(&[7]);
        b.expand(1, 2);
        assert_eq!(b.as_words(), &[7, 0, 0]);
    }

    #[test]
    fn test_view_reads() {
        let words: Vec<u32> = vec![5, 6, 7];
        let v = ViewBuffer::new(&words);
        assert_eq!(v.size_in_words(), 3);
        assert_eq!(v.word(2), 7);
        assert_eq!(v.as_words(), &[5, 6, 7]);
    }

    #[test]
    fn test_clear_keeps_header_word() {
        let mut b = GrowableBuffer::<u64>::from_words(&[1, 2, 3]);
        BufferMut::clear(&mut b);
        assert_eq!(b.as_words(), &[0]);
    }
}
