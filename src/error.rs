use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bit index {index} out of range (maximum {max})")]
    IndexOutOfBounds { index: usize, max: usize },
    #[error("cannot resize from {from} bits to {to} bits across a word boundary")]
    InvalidResize { from: usize, to: usize },
    #[error("buffer capacity exceeded at {0} words")]
    CapacityExceeded(usize),
    #[error("malformed bitmap: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
