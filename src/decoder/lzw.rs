use super::bit_reader::BitReader;
use super::ParserError;

const MAX_CODE_SIZE: u32 = 12;
const MAX_TABLE_LEN: usize = 1 << MAX_CODE_SIZE;

/// Decodes a GIF LZW code stream back into palette indices.
pub fn decompress(buf: &[u8], minimum_code_size: u8) -> Result<Vec<u8>, ParserError> {
    if !(1..=11).contains(&minimum_code_size) {
        return Err(ParserError::InvalidCodeSize(minimum_code_size));
    }

    let clear_code: u16 = 1 << minimum_code_size;
    let end_of_information_code = clear_code + 1;

    let mut reader = BitReader::new(buf);
    let mut code_size = u32::from(minimum_code_size) + 1;
    let mut code_table = init_code_table(minimum_code_size);
    let mut last_code: Option<u16> = None;

    let mut indicies: Vec<u8> = Vec::new();

    loop {
        let code = reader.next(code_size).ok_or(ParserError::TruncatedImageData)?;

        if code == clear_code {
            code_size = u32::from(minimum_code_size) + 1;
            code_table = init_code_table(minimum_code_size);
            last_code = None;
            continue;
        }

        if code == end_of_information_code {
            break;
        }

        let new_code_table_entry = match (last_code, code_table.get(usize::from(code))) {
            // first code after a clear only outputs
            (None, Some(code_indicies)) => {
                indicies.extend_from_slice(code_indicies);
                None
            }
            (Some(last), Some(code_indicies)) => {
                // {CODE-1} + first index of {CODE}
                let mut entry = code_table[usize::from(last)].clone();
                entry.push(code_indicies[0]);
                indicies.extend_from_slice(code_indicies);
                Some(entry)
            }
            // code not in the table yet, has to be the one about to be added
            (Some(last), None) if usize::from(code) == code_table.len() => {
                // {CODE-1} + first index of {CODE-1}
                let mut entry = code_table[usize::from(last)].clone();
                entry.push(entry[0]);
                indicies.extend_from_slice(&entry);
                Some(entry)
            }
            _ => {
                return Err(ParserError::InvalidCode {
                    code,
                    table_len: code_table.len(),
                })
            }
        };

        if let Some(entry) = new_code_table_entry {
            if code_table.len() < MAX_TABLE_LEN {
                code_table.push(entry);
            }
        }
        last_code = Some(code);

        if code_table.len() >= (1 << code_size) && code_size < MAX_CODE_SIZE {
            code_size += 1;
        }
    }

    Ok(indicies)
}

// clear and end of information get placeholder entries so codes index directly
fn init_code_table(minimum_code_size: u8) -> Vec<Vec<u8>> {
    let min_table_length: u16 = (1 << minimum_code_size) + 1;
    (0..=min_table_length).map(|i| vec![i as u8]).collect()
}
