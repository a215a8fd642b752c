use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use super::bit_writer::BitWriter;

pub const MAX_CODE_SIZE: u32 = 12;

/// Once this many codes are assigned the table is cleared and reseeded.
const CODE_LIMIT: u16 = 4095;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LzwError {
    #[error("minimum code size {0} is outside the supported range 2..=8")]
    InvalidCodeSize(u8),

    #[error("index {symbol} does not fit an alphabet of {alphabet} symbols")]
    SymbolOutOfRange { symbol: u8, alphabet: u16 },
}

/// String table keyed by (code of the prefix string, next symbol), so a
/// string is never materialised; it is always "some known code + one byte".
struct CodeTable {
    entries: HashMap<(u16, u8), u16>,
    min_code_size: u8,
    next_code: u16,
    code_size: u32,
}

impl CodeTable {
    fn new(min_code_size: u8) -> Self {
        let mut table = Self {
            entries: HashMap::new(),
            min_code_size,
            next_code: 0,
            code_size: 0,
        };
        table.reset();
        table
    }

    fn clear_code(&self) -> u16 {
        1 << self.min_code_size
    }

    fn end_code(&self) -> u16 {
        self.clear_code() + 1
    }

    // single symbol strings are implicit: code == symbol
    fn reset(&mut self) {
        self.entries.clear();
        self.next_code = self.end_code() + 1;
        self.code_size = u32::from(self.min_code_size) + 1;
    }

    fn get(&self, prefix: u16, symbol: u8) -> Option<u16> {
        self.entries.get(&(prefix, symbol)).copied()
    }

    fn insert(&mut self, prefix: u16, symbol: u8) {
        self.entries.insert((prefix, symbol), self.next_code);
        self.next_code += 1;
    }

    /// Writes a string code at the current width, then widens if the decoder
    /// can now be handed a code that needs one more bit.
    fn emit(&mut self, writer: &mut BitWriter, code: u16) {
        writer.write(code, self.code_size);

        if u32::from(self.next_code) >= (1 << self.code_size) && self.code_size < MAX_CODE_SIZE {
            self.code_size += 1;
        }
    }
}

/// Compresses one frame of palette indices into a GIF LZW code stream.
///
/// The stream opens with a clear code and closes with the end of
/// information code; the trailing partial byte is zero padded. The result
/// is the raw code stream, not yet split into data sub-blocks.
pub fn compress(min_code_size: u8, indices: &[u8]) -> Result<Vec<u8>, LzwError> {
    if !(2..=8).contains(&min_code_size) {
        return Err(LzwError::InvalidCodeSize(min_code_size));
    }

    let mut table = CodeTable::new(min_code_size);
    let clear_code = table.clear_code();
    let end_code = table.end_code();

    if let Some(&symbol) = indices.iter().find(|&&symbol| u16::from(symbol) >= clear_code) {
        return Err(LzwError::SymbolOutOfRange { symbol, alphabet: clear_code });
    }

    let mut writer = BitWriter::new();
    writer.write(clear_code, table.code_size);

    let Some((&first, rest)) = indices.split_first() else {
        writer.write(end_code, table.code_size);
        return Ok(writer.finish());
    };

    let mut prefix = u16::from(first);
    let mut resets = 0;

    for &symbol in rest {
        if let Some(code) = table.get(prefix, symbol) {
            prefix = code;
            continue;
        }

        table.emit(&mut writer, prefix);
        table.insert(prefix, symbol);
        prefix = u16::from(symbol);

        if table.next_code >= CODE_LIMIT {
            writer.write(clear_code, table.code_size);
            table.reset();
            resets += 1;
        }
    }

    table.emit(&mut writer, prefix);
    writer.write(end_code, table.code_size);

    debug!("compressed {} indices with min code size {min_code_size}, {resets} table resets", indices.len());
    Ok(writer.finish())
}
