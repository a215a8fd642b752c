pub struct BitReader<'a> {
    buf: &'a [u8],
    // index by bit instead of by byte
    position: usize,
    length: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            position: 0,
            length: buf.len() * 8,
        }
    }

    /// Reads the next `count` bits, least significant first. `None` once
    /// fewer than `count` bits remain.
    pub fn next(&mut self, count: u32) -> Option<u16> {
        debug_assert!(count <= 16);

        let start_position = self.position;
        let end_position = self.position + count as usize;

        if end_position > self.length {
            return None;
        }

        // end_position not inclusive
        let mut value: u16 = 0;
        for (out_shift, i) in (start_position..end_position).enumerate() {
            let bit = (self.buf[i / 8] >> (i % 8)) & 1;
            value |= u16::from(bit) << out_shift;
        }
        self.position = end_position;
        Some(value)
    }
}
