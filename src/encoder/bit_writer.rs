/// Packs variable width codes least significant bit first, the order the
/// GIF image data stream expects.
pub struct BitWriter {
    out: Vec<u8>,
    buffer: u32,
    // number of pending bits in `buffer`, always < 8 between calls
    length: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            buffer: 0,
            length: 0,
        }
    }

    pub fn write(&mut self, code: u16, width: u32) {
        debug_assert!(width <= 16);
        debug_assert!(u32::from(code) < (1 << width));

        self.buffer |= u32::from(code) << self.length;
        self.length += width;

        while self.length >= 8 {
            self.out.push((self.buffer & 0xff) as u8);
            self.buffer >>= 8;
            self.length -= 8;
        }
    }

    /// Flushes the trailing partial byte, zero padded.
    pub fn finish(mut self) -> Vec<u8> {
        if self.length > 0 {
            self.out.push((self.buffer & 0xff) as u8);
        }
        self.out
    }
}
