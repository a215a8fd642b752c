mod bit_reader;
pub(crate) mod lzw;
mod parser;

#[cfg(test)]
pub(crate) use bit_reader::BitReader;

pub use parser::{Decoder, ParserError};
