// Fixed binary layout for compressed bitmaps, little-endian throughout:
// u32 bit length, u32 word count, the raw words, u32 open header position.
// The word payload is written through bytemuck so the on-disk bytes are the
// in-memory representation; deserialization can therefore either copy into
// an owned buffer or reinterpret a byte region in place.

#[cfg(target_endian = "big")]
compile_error!("the serialized bitmap layout assumes a little-endian target");

use std::io::{Read, Write};

use crate::buffer::{Buffer, GrowableBuffer, ViewBuffer};
use crate::error::{Error, Result};
use crate::ewah::Ewah;
use crate::word::Word;

pub(crate) fn write_to<W: Word, B: Buffer<W>>(
    bitmap: &Ewah<W, B>,
    out: &mut impl Write,
) -> Result<()> {
    let words = bitmap.as_words();
    if bitmap.size_in_bits() > u32::MAX as usize || words.len() > u32::MAX as usize {
        return Err(Error::CapacityExceeded(words.len()));
    }
    out.write_all(&(bitmap.size_in_bits() as u32).to_le_bytes())?;
    out.write_all(&(words.len() as u32).to_le_bytes())?;
    out.write_all(bytemuck::cast_slice(words))?;
    out.write_all(&(bitmap.open_header_position() as u32).to_le_bytes())?;
    Ok(())
}

fn read_u32(input: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn le_u32(bytes: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = bytes[..4]
        .try_into()
        .map_err(|_| Error::Format("truncated length field".into()))?;
    Ok(u32::from_le_bytes(arr))
}

pub(crate) fn read_from<W: Word>(input: &mut impl Read) -> Result<Ewah<W, GrowableBuffer<W>>> {
    let size_in_bits = read_u32(input)? as usize;
    let count = read_u32(input)? as usize;
    let mut words = vec![W::zero(); count];
    input.read_exact(bytemuck::cast_slice_mut(&mut words))?;
    let rlw_pos = read_u32(input)? as usize;
    validate(size_in_bits, &words, rlw_pos)?;
    log::debug!("deserialized bitmap: {count} words, {size_in_bits} bits");
    Ok(Ewah::from_parts(
        GrowableBuffer::from_words(&words),
        rlw_pos,
        size_in_bits,
    ))
}

// Reinterprets the word payload in place. The payload starts at byte
// offset 8, so `bytes` must be aligned for `W`.
pub(crate) fn view_from_bytes<W: Word>(bytes: &[u8]) -> Result<Ewah<W, ViewBuffer<'_, W>>> {
    if bytes.len() < 12 {
        return Err(Error::Format("truncated bitmap: shorter than the fixed fields".into()));
    }
    let size_in_bits = le_u32(&bytes[0..4])? as usize;
    let count = le_u32(&bytes[4..8])? as usize;
    let payload = count
        .checked_mul(core::mem::size_of::<W>())
        .ok_or_else(|| Error::Format("word count overflows the byte length".into()))?;
    if bytes.len() != 8 + payload + 4 {
        return Err(Error::Format(format!(
            "byte length {} does not match {count} words",
            bytes.len()
        )));
    }
    let words: &[W] = bytemuck::try_cast_slice(&bytes[8..8 + payload])
        .map_err(|_| Error::Format("word payload is not aligned for the word type".into()))?;
    let rlw_pos = le_u32(&bytes[8 + payload..])? as usize;
    validate(size_in_bits, words, rlw_pos)?;
    Ok(Ewah::from_parts(ViewBuffer::new(words), rlw_pos, size_in_bits))
}

// Structural checks on an untrusted stream: every literal count must stay
// inside the buffer, the recorded open header must be the final header, and
// the bit length must account for exactly the decoded words.
fn validate<W: Word>(size_in_bits: usize, words: &[W], rlw_pos: usize) -> Result<()> {
    if words.is_empty() {
        return Err(Error::Format("empty word stream".into()));
    }
    let mut pos = 0;
    let mut logical = 0u64;
    let mut last_header = 0;
    while pos < words.len() {
        last_header = pos;
        let header = words[pos];
        logical += header.run_len() as u64 + header.literal_count() as u64;
        pos += 1 + header.literal_count();
    }
    if pos != words.len() {
        return Err(Error::Format(format!(
            "literal count at word {last_header} overruns the stream"
        )));
    }
    if last_header != rlw_pos {
        return Err(Error::Format(format!(
            "open header recorded at {rlw_pos}, found at {last_header}"
        )));
    }
    if logical != size_in_bits.div_ceil(W::BITS as usize) as u64 {
        return Err(Error::Format(format!(
            "bit length {size_in_bits} disagrees with {logical} decoded words"
        )));
    }
    Ok(())
}
