// Word-aligned run-length-compressed bitmaps. Each compressed stream is a
// sequence of chunks: a header word describing a run of uniform words and a
// count of verbatim literal words that follow it. Logical operations run
// directly over the compressed form and stream their output into a sink, so
// AND/OR/XOR/threshold never decompress either operand.

mod buffer;
mod chunk;
mod cursor;
mod error;
mod ewah;
mod merge;
mod serialize;
mod sink;
mod word;

pub use buffer::{Buffer, BufferMut, GrowableBuffer, ViewBuffer};
pub use chunk::{Chunk, Chunks};
pub use cursor::{BufferedCursor, RawCursor};
pub use error::{Error, Result};
pub use ewah::{Ewah, Ewah32, Ewah64, EwahView, OnesIter};
pub use merge::{and_into, and_not_into, or_into, threshold_into, xor_into, xor_multi_into};
pub use sink::{BitCounter, NonEmptyProbe, Sink, SinkResult, Stop};
pub use word::Word;
