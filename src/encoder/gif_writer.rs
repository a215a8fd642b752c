use log::debug;

use super::{ContainerError, ContainerWriter, FrameBlock, LoopCount};

const SIGNATURE: &[u8] = b"GIF89a";

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

const APPLICATION_EXTENSION: u8 = 0xff;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;

const MAX_SUB_BLOCK_LEN: usize = 255;

/// GIF89a container writer.
///
/// Writes at a cursor into the buffer handed over by `begin`. Every frame
/// carries its own local color table, there is no global one.
#[derive(Debug, Default)]
pub struct GifWriter {
    buffer: Vec<u8>,
    position: usize,
    screen: Option<(u16, u16)>,
}

impl GifWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        // the caller's size is an estimate; never write past the end
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    fn put_byte(&mut self, byte: u8) {
        self.put(&[byte]);
    }

    fn put_u16(&mut self, value: u16) {
        // multi-byte numeric fields are least significant byte first
        self.put(&value.to_le_bytes());
    }

    fn put_sub_blocks(&mut self, data: &[u8]) {
        for chunk in data.chunks(MAX_SUB_BLOCK_LEN) {
            self.put_byte(chunk.len() as u8);
            self.put(chunk);
        }
        // block terminator
        self.put_byte(0);
    }

    fn put_graphic_control(&mut self, frame: &FrameBlock<'_>) {
        // XXXYYYZW: reserved, disposal method, user input flag, transparent color flag
        let packed_fields = (((frame.disposal as u8) & 0b111) << 2) | u8::from(frame.transparent_index.is_some());

        self.put(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_EXTENSION, 4, packed_fields]);
        self.put_u16(frame.delay_cs);
        self.put_byte(frame.transparent_index.unwrap_or(0));
        self.put_byte(0);
    }

    fn put_loop_extension(&mut self, loop_count: LoopCount) {
        self.put(&[EXTENSION_INTRODUCER, APPLICATION_EXTENSION, 11]);
        self.put(b"NETSCAPE2.0");
        self.put(&[3, 1]);
        self.put_u16(loop_count.as_u16());
        self.put_byte(0);
    }
}

/// Size code for a color table of `len` bytes: the table holds
/// `2^(code + 1)` entries.
fn color_table_size_code(len: usize) -> Result<u8, ContainerError> {
    let entries = len / 3;
    if len % 3 != 0 || !entries.is_power_of_two() || !(2..=256).contains(&entries) {
        return Err(ContainerError::PaletteSize(len));
    }
    Ok(entries.trailing_zeros() as u8 - 1)
}

impl ContainerWriter for GifWriter {
    fn begin(&mut self, buffer: Vec<u8>, width: u16, height: u16, loop_count: LoopCount) -> Result<(), ContainerError> {
        // a job that failed half way leaves a started animation behind; a new
        // one simply replaces it
        self.buffer = buffer;
        self.position = 0;
        self.screen = Some((width, height));

        self.put(SIGNATURE);

        // logical screen descriptor: no global color table, so the packed
        // fields, background color index and aspect ratio are all zero
        self.put_u16(width);
        self.put_u16(height);
        self.put(&[0, 0, 0]);

        self.put_loop_extension(loop_count);

        debug!("started {width}x{height} GIF, loop count {loop_count:?}");
        Ok(())
    }

    fn add_frame(&mut self, frame: &FrameBlock<'_>) -> Result<(), ContainerError> {
        let (screen_width, screen_height) = self.screen.ok_or(ContainerError::NotStarted)?;

        let right = u32::from(frame.left) + u32::from(frame.width);
        let bottom = u32::from(frame.top) + u32::from(frame.height);
        if right > u32::from(screen_width) || bottom > u32::from(screen_height) {
            return Err(ContainerError::FrameOutOfBounds {
                left: frame.left,
                top: frame.top,
                width: frame.width,
                height: frame.height,
                screen_width,
                screen_height,
            });
        }

        if frame.indices.len() != usize::from(frame.width) * usize::from(frame.height) {
            return Err(ContainerError::IndexCount {
                width: frame.width,
                height: frame.height,
                actual: frame.indices.len(),
            });
        }

        let size_code = color_table_size_code(frame.palette.len())?;

        self.put_graphic_control(frame);

        self.put_byte(IMAGE_DESCRIPTOR_LABEL);
        self.put_u16(frame.left);
        self.put_u16(frame.top);
        self.put_u16(frame.width);
        self.put_u16(frame.height);
        // local color table flag, not interlaced, not sorted
        self.put_byte(0b10000000 | size_code);
        self.put(frame.palette);

        self.put_byte(frame.min_code_size);
        self.put_sub_blocks(frame.lzw_data);

        Ok(())
    }

    fn finish(&mut self) -> Result<(Vec<u8>, usize), ContainerError> {
        if self.screen.take().is_none() {
            return Err(ContainerError::NotStarted);
        }

        self.put_byte(TRAILER_LABEL);

        let end = self.position;
        self.position = 0;
        Ok((std::mem::take(&mut self.buffer), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{lzw, DisposalMethod};

    fn frame<'a>(indices: &'a [u8], lzw_data: &'a [u8], palette: &'a [u8]) -> FrameBlock<'a> {
        FrameBlock {
            left: 0,
            top: 0,
            width: 2,
            height: 2,
            indices,
            min_code_size: 2,
            lzw_data,
            palette,
            delay_cs: 10,
            disposal: DisposalMethod::Unspecified,
            transparent_index: None,
        }
    }

    #[test]
    fn writes_expected_layout() {
        let indices = [0, 1, 1, 0];
        let data = lzw::compress(2, &indices).unwrap();
        let palette = [255, 0, 0, 0, 0, 255];

        let mut writer = GifWriter::new();
        writer.begin(vec![0; 64], 2, 2, LoopCount::Infinite).unwrap();
        writer.add_frame(&frame(&indices, &data, &palette)).unwrap();
        let (bytes, end) = writer.finish().unwrap();
        let bytes = &bytes[..end];

        let mut expected = Vec::new();
        expected.extend_from_slice(b"GIF89a");
        expected.extend_from_slice(&[2, 0, 2, 0, 0, 0, 0]);
        expected.extend_from_slice(&[0x21, 0xff, 11]);
        expected.extend_from_slice(b"NETSCAPE2.0");
        expected.extend_from_slice(&[3, 1, 0, 0, 0]);
        expected.extend_from_slice(&[0x21, 0xf9, 4, 0, 10, 0, 0, 0]);
        expected.extend_from_slice(&[0x2c, 0, 0, 0, 0, 2, 0, 2, 0, 0x80]);
        expected.extend_from_slice(&palette);
        expected.push(2);
        expected.push(data.len() as u8);
        expected.extend_from_slice(&data);
        expected.extend_from_slice(&[0, 0x3b]);

        assert_eq!(bytes, expected.as_slice());
    }

    #[test]
    fn transparency_and_disposal_in_graphic_control() {
        let indices = [0, 0, 0, 0];
        let data = lzw::compress(2, &indices).unwrap();
        let palette = [0; 12];

        let mut block = frame(&indices, &data, &palette);
        block.disposal = DisposalMethod::RestoreToBackgroundColor;
        block.transparent_index = Some(0);
        block.delay_cs = 300;

        let mut writer = GifWriter::new();
        writer.begin(Vec::new(), 2, 2, LoopCount::Number(3)).unwrap();
        writer.add_frame(&block).unwrap();
        let (bytes, end) = writer.finish().unwrap();

        let gce = bytes.windows(2).position(|w| w == [0x21, 0xf9]).unwrap();
        assert_eq!(&bytes[gce..gce + 8], &[0x21, 0xf9, 4, 0b00001001, 0x2c, 0x01, 0, 0]);
        // 4 entry local table
        let descriptor = gce + 8;
        assert_eq!(bytes[descriptor], 0x2c);
        assert_eq!(bytes[descriptor + 9], 0x81);
        // loop count 3 in the NETSCAPE block
        assert_eq!(&bytes[16..21], b"NETSC");
        assert_eq!(&bytes[27..31], &[3, 1, 3, 0]);
        assert_eq!(bytes[end - 1], 0x3b);
    }

    #[test]
    fn splits_long_streams_into_sub_blocks() {
        let data: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut writer = GifWriter::new();
        writer.begin(vec![0; 16], 1, 1, LoopCount::Infinite).unwrap();
        let start = writer.position;
        writer.put_sub_blocks(&data);

        let written = &writer.buffer[start..writer.position];
        assert_eq!(written.len(), 600 + 3 + 1);
        assert_eq!(written[0], 255);
        assert_eq!(written[256], 255);
        assert_eq!(written[512], 90);
        assert_eq!(written[written.len() - 1], 0);
    }

    #[test]
    fn grows_an_undersized_buffer() {
        let mut writer = GifWriter::new();
        writer.begin(vec![0; 4], 1, 1, LoopCount::Infinite).unwrap();
        let (bytes, end) = writer.finish().unwrap();
        assert_eq!(end, bytes.len());
        assert_eq!(&bytes[..6], b"GIF89a");
    }

    #[test]
    fn begin_discards_an_unfinished_animation() {
        let mut writer = GifWriter::new();
        writer.begin(vec![0; 8], 3, 3, LoopCount::Infinite).unwrap();
        writer.begin(vec![0; 8], 1, 1, LoopCount::Infinite).unwrap();
        let (bytes, end) = writer.finish().unwrap();
        assert_eq!(end, 33);
        assert_eq!(&bytes[6..8], &[1, 0]);
    }

    #[test]
    fn truncation_point_is_the_cursor() {
        let mut writer = GifWriter::new();
        writer.begin(vec![0xaa; 1024], 1, 1, LoopCount::Infinite).unwrap();
        let (bytes, end) = writer.finish().unwrap();
        assert_eq!(bytes.len(), 1024);
        assert_eq!(end, 6 + 7 + 19 + 1);
        assert_eq!(bytes[end - 1], 0x3b);
        assert_eq!(bytes[end], 0xaa);
    }

    #[test]
    fn output_decodes_with_image_crate() {
        use image::codecs::gif::GifDecoder;
        use image::AnimationDecoder;

        let red: Vec<u8> = [200, 10, 10, 255].repeat(9);
        let mut checker: Vec<u8> = Vec::new();
        for i in 0..9 {
            checker.extend_from_slice(if i % 2 == 0 { &[0, 0, 0, 255] } else { &[255, 255, 255, 255] });
        }

        let mut writer = GifWriter::new();
        let timing = crate::encoder::FrameTiming::from_fps(10);
        let encoded = crate::encoder::encode_animation(Some(&mut writer), &[red.clone(), checker.clone()], 3, &timing).unwrap();

        let decoder = GifDecoder::new(std::io::Cursor::new(encoded.bytes)).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].buffer().as_raw(), &red);
        assert_eq!(frames[1].buffer().as_raw(), &checker);

        let (numer, denom) = frames[0].delay().numer_denom_ms();
        assert_eq!(numer / denom, 100);
    }

    #[test]
    fn rejects_misuse() {
        let mut writer = GifWriter::new();
        let indices = [0; 4];
        let palette = [0; 6];
        assert_eq!(writer.add_frame(&frame(&indices, &[], &palette)), Err(ContainerError::NotStarted));
        assert_eq!(writer.finish().unwrap_err(), ContainerError::NotStarted);

        writer.begin(Vec::new(), 1, 1, LoopCount::Infinite).unwrap();
        assert!(matches!(
            writer.add_frame(&frame(&indices, &[], &palette)),
            Err(ContainerError::FrameOutOfBounds { .. })
        ));

        let mut writer = GifWriter::new();
        writer.begin(Vec::new(), 2, 2, LoopCount::Infinite).unwrap();
        assert_eq!(writer.add_frame(&frame(&indices, &[], &[0; 9])), Err(ContainerError::PaletteSize(9)));
        assert_eq!(
            writer.add_frame(&frame(&indices[..3], &[], &palette)),
            Err(ContainerError::IndexCount { width: 2, height: 2, actual: 3 })
        );
    }
}
