// Machine-word abstraction and the header-word codec.
//
// A compressed stream is a sequence of chunks: one header word followed by
// that header's literal words. The header packs three fields:
//   bit 0                  run bit (the value repeated by the run)
//   bits 1..=RUN_BITS      run length, in words
//   remaining high bits    count of literal words following this header
// Being generic over the word type gives the 64-bit and 32-bit variants of
// the format from a single implementation.

use core::fmt::Debug;
use num::traits::AsPrimitive;
use num::PrimInt;
use num::Unsigned;

/// Trait representing an unsigned integer type used as a bitmap word,
/// which allows the compressed structures to be generic over word width.
pub trait Word:
    PrimInt + Unsigned + AsPrimitive<usize> + bytemuck::Pod + Debug + 'static
{
    const BITS: u32; // number of bits in the representation of this type

    /// Width of the run-length field in a header word.
    const RUN_BITS: u32 = Self::BITS / 2;

    /// Width of the literal-count field in a header word.
    const LITERAL_BITS: u32 = Self::BITS - 1 - Self::RUN_BITS;

    /// Largest run length one header can carry.
    const MAX_RUN: u64 = (1 << Self::RUN_BITS) - 1;

    /// Largest literal count one header can carry.
    const MAX_LITERAL: u64 = (1 << Self::LITERAL_BITS) - 1;

    // panics in debug builds if the value does not fit
    fn from_usize(n: usize) -> Self;

    /// Word with every bit set.
    fn ones() -> Self {
        Self::max_value()
    }

    /// Return a mask with `n` 1-bits set in the low bits. `n` may be 0 or BITS.
    fn low_mask(n: u32) -> Self {
        if n == 0 {
            Self::zero()
        } else {
            Self::ones() >> ((Self::BITS - n) as usize)
        }
    }

    fn usize(self) -> usize {
        self.as_()
    }

    /// The run bit of this header word.
    fn run_bit(self) -> bool {
        self & Self::one() == Self::one()
    }

    /// The run length (in words) of this header word.
    fn run_len(self) -> usize {
        ((self >> 1) & Self::low_mask(Self::RUN_BITS)).as_()
    }

    /// The number of literal words following this header word.
    fn literal_count(self) -> usize {
        (self >> ((Self::RUN_BITS + 1) as usize)).as_()
    }

    /// This header word with the run bit replaced; other fields preserved.
    fn with_run_bit(self, bit: bool) -> Self {
        if bit {
            self | Self::one()
        } else {
            self & !Self::one()
        }
    }

    /// This header word with the run length replaced; other fields preserved.
    fn with_run_len(self, len: usize) -> Self {
        debug_assert!(len as u64 <= Self::MAX_RUN);
        let field = Self::low_mask(Self::RUN_BITS) << 1usize;
        (self & !field) | (Self::from_usize(len) << 1usize)
    }

    /// This header word with the literal count replaced; other fields preserved.
    fn with_literal_count(self, count: usize) -> Self {
        debug_assert!(count as u64 <= Self::MAX_LITERAL);
        let shift = (Self::RUN_BITS + 1) as usize;
        let field = Self::low_mask(Self::LITERAL_BITS) << shift;
        (self & !field) | (Self::from_usize(count) << shift)
    }

    /// Build a header word from its three fields.
    fn header(bit: bool, run_len: usize, literal_count: usize) -> Self {
        Self::zero()
            .with_run_bit(bit)
            .with_run_len(run_len)
            .with_literal_count(literal_count)
    }
}

impl Word for u32 {
    const BITS: u32 = Self::BITS;

    fn from_usize(n: usize) -> Self {
        debug_assert!(n <= u32::MAX as usize);
        n as u32
    }
}

impl Word for u64 {
    const BITS: u32 = Self::BITS;

    fn from_usize(n: usize) -> Self {
        n as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_widths() {
        assert_eq!(u64::RUN_BITS, 32);
        assert_eq!(u64::LITERAL_BITS, 31);
        assert_eq!(u64::MAX_RUN, (1 << 32) - 1);
        assert_eq!(u64::MAX_LITERAL, (1 << 31) - 1);
        assert_eq!(u32::RUN_BITS, 16);
        assert_eq!(u32::LITERAL_BITS, 15);
        assert_eq!(u32::MAX_RUN, (1 << 16) - 1);
        assert_eq!(u32::MAX_LITERAL, (1 << 15) - 1);
    }

    #[test]
    fn test_low_mask() {
        assert_eq!(u64::low_mask(0), 0);
        assert_eq!(u64::low_mask(1), 1);
        assert_eq!(u64::low_mask(63), u64::MAX >> 1);
        assert_eq!(u64::low_mask(64), u64::MAX);
        assert_eq!(u32::low_mask(32), u32::MAX);
    }

    #[test]
    fn test_setters_preserve_other_fields() {
        let h = u64::header(true, 12345, 678);
        assert!(h.run_bit());
        assert_eq!(h.run_len(), 12345);
        assert_eq!(h.literal_count(), 678);

        let h = h.with_run_len(u64::MAX_RUN as usize);
        assert!(h.run_bit());
        assert_eq!(h.run_len(), u64::MAX_RUN as usize);
        assert_eq!(h.literal_count(), 678);

        let h = h.with_literal_count(u64::MAX_LITERAL as usize);
        assert!(h.run_bit());
        assert_eq!(h.run_len(), u64::MAX_RUN as usize);
        assert_eq!(h.literal_count(), u64::MAX_LITERAL as usize);

        let h = h.with_run_bit(false);
        assert!(!h.run_bit());
        assert_eq!(h.run_len(), u64::MAX_RUN as usize);
        assert_eq!(h.literal_count(), u64::MAX_LITERAL as usize);
    }

    #[test]
    fn test_narrow_header_roundtrip() {
        let h = u32::header(false, 65535, 32767);
        assert!(!h.run_bit());
        assert_eq!(h.run_len(), 65535);
        assert_eq!(h.literal_count(), 32767);
        assert_eq!(h.with_run_len(0).run_len(), 0);
        assert_eq!(h.with_run_len(0).literal_count(), 32767);
    }
}
