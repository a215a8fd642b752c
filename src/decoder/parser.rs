use super::lzw;

use anyhow::Result;
use log::debug;
use thiserror::Error;

use std::io::prelude::*;

use crate::encoder::{DisposalMethod, LoopCount};

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

#[derive(Debug)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
}

impl TryFrom<u8> for ExtensionType {
    type Error = ParserError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use ExtensionType::*;

        match value {
            APPLICATION_EXTENSION => Ok(Application),
            COMMENT_EXTENSION => Ok(Comment),
            GRAPHIC_CONTROL_EXTENSION => Ok(GraphicControl),
            PLAIN_TEXT_EXTENSION => Ok(PlainText),

            _ => Err(ParserError::InvalidExtensionLabel(value)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicControlExtension {
    disposal_method: u8,
    transparent_color_flag: bool,
    delay_time: u16,
    transparent_color_index: u8,
}

#[derive(Debug)]
enum ParserState {
    ProcessMagic,
    ProcessLogicalScreenDescriptor,
    ProcessGlobalColorTable(usize),
    DetermineNextBlock(Option<GraphicControlExtension>),
    ProcessExtension(u8),
    ProcessImageDescriptor(Option<GraphicControlExtension>),
    Done,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParserError {
    #[error("signature is invalid")]
    InvalidSignature,

    #[error("version {0} in the header is unsupported")]
    UnsupportedVersion(String),

    #[error("encountered extension with label 0x{0:02x}, this label is not supported")]
    InvalidExtensionLabel(u8),

    #[error("encountered unexpected label, this label is not supported: {0}")]
    UnexpectedLabel(u8),

    #[error("graphic control extension holds {0} bytes, expected 4")]
    ShortGraphicControl(usize),

    #[error("image at frame {0} has neither a local nor a global color table")]
    MissingColorTable(usize),

    #[error("interlaced images are not supported")]
    Interlaced,

    #[error("LZW minimum code size {0} is invalid")]
    InvalidCodeSize(u8),

    #[error("code {code} is not in the code table (table length {table_len})")]
    InvalidCode { code: u16, table_len: usize },

    #[error("image data ended before the end of information code")]
    TruncatedImageData,

    #[error("image at frame {frame} decoded to {actual} indices, expected {expected}")]
    PixelCountMismatch {
        frame: usize,
        expected: usize,
        actual: usize,
    },
}

/// One image block together with the graphic control that preceded it.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub delay_cs: u16,
    pub disposal: Option<DisposalMethod>,
    pub transparent_index: Option<u8>,
    /// Flat `r, g, b` table, local if present, otherwise the global one.
    pub palette: Box<[u8]>,
    pub has_local_color_table: bool,
    pub indices: Box<[u8]>,
}

impl DecodedFrame {
    /// Expands the indices to RGBA, transparent pixels become `[0, 0, 0, 0]`.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.indices
            .iter()
            .flat_map(|&index| {
                if Some(index) == self.transparent_index {
                    return [0, 0, 0, 0];
                }
                let at = usize::from(index) * 3;
                match self.palette.get(at..at + 3) {
                    Some(rgb) => [rgb[0], rgb[1], rgb[2], 255],
                    None => [0, 0, 0, 255],
                }
            })
            .collect()
    }
}

/// Reads a GIF87a/GIF89a stream into its frames.
#[derive(Debug)]
pub struct Decoder<'a, T: Read> {
    inner: &'a mut T,
    screen_width: u16,
    screen_height: u16,
    global_color_table: Option<Box<[u8]>>,
    loop_count: Option<LoopCount>,
    comments: Vec<String>,
    frames: Vec<DecodedFrame>,
}

impl<'a, T: Read> Decoder<'a, T> {
    pub fn new(inner: &'a mut T) -> Self {
        Self {
            inner,
            screen_width: 0,
            screen_height: 0,
            global_color_table: None,
            loop_count: None,
            comments: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Result<()> {
        let mut state = ParserState::ProcessMagic;

        loop {
            debug!("begin parsing state {:?}", state);

            state = self.process_next_state(state)?;
            if let ParserState::Done = state {
                break Ok(());
            }
        }
    }

    pub fn screen_size(&self) -> (u16, u16) {
        (self.screen_width, self.screen_height)
    }

    pub fn loop_count(&self) -> Option<LoopCount> {
        self.loop_count
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn frames(&self) -> &[DecodedFrame] {
        &self.frames
    }

    fn process_next_state(&mut self, next_state: ParserState) -> Result<ParserState> {
        use ParserState::*;

        match next_state {
            ProcessMagic => {
                let signature = self.read_bytes(3)?;
                if signature.as_ref() != b"GIF" {
                    return Err(ParserError::InvalidSignature.into());
                }

                let version = self.read_bytes(3)?;
                if !matches!(version.as_ref(), b"87a" | b"89a") {
                    return Err(ParserError::UnsupportedVersion(String::from_utf8_lossy(&version).into_owned()).into());
                }
                debug!("processed signature and version");

                Ok(ProcessLogicalScreenDescriptor)
            }
            ProcessLogicalScreenDescriptor => {
                self.screen_width = self.read_u16()?;
                self.screen_height = self.read_u16()?;

                let packed_fields = self.read_byte()?;
                let global_color_table_flag = packed_fields & 0b10000000 != 0;
                let global_color_table_size = color_table_len(packed_fields);

                // background color index, pixel aspect ratio
                self.read_bytes(2)?;

                debug!(
                    "processed logical screen descriptor {}x{}, global color table: {global_color_table_flag}",
                    self.screen_width, self.screen_height
                );

                if global_color_table_flag {
                    Ok(ProcessGlobalColorTable(global_color_table_size))
                } else {
                    Ok(DetermineNextBlock(None))
                }
            }
            ProcessGlobalColorTable(size) => {
                self.global_color_table = Some(self.read_bytes(size)?);
                Ok(DetermineNextBlock(None))
            }
            DetermineNextBlock(graphic_control_extension) => {
                match self.read_byte()? {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => Ok(ProcessExtension(self.read_byte()?)),
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor(graphic_control_extension)),
                    TRAILER_LABEL => Ok(Done),
                    label => Err(ParserError::UnexpectedLabel(label).into()),
                }
            }
            ProcessExtension(label) => self.process_extension(ExtensionType::try_from(label)?),
            ProcessImageDescriptor(graphic_control_extension) => {
                self.process_image(graphic_control_extension)?;
                Ok(DetermineNextBlock(None))
            }
            Done => Ok(Done),
        }
    }

    fn process_image(&mut self, graphic_control_extension: Option<GraphicControlExtension>) -> Result<()> {
        let left = self.read_u16()?;
        let top = self.read_u16()?;
        let width = self.read_u16()?;
        let height = self.read_u16()?;

        let packed_fields = self.read_byte()?;
        let local_color_table_flag = packed_fields & 0b10000000 != 0;
        let interlace_flag = packed_fields & 0b01000000 != 0;

        if interlace_flag {
            return Err(ParserError::Interlaced.into());
        }

        let frame_number = self.frames.len();
        let palette = if local_color_table_flag {
            self.read_bytes(color_table_len(packed_fields))?
        } else {
            self.global_color_table
                .clone()
                .ok_or(ParserError::MissingColorTable(frame_number))?
        };

        let lzw_code_size = self.read_byte()?;
        let data_stream = self.read_data_sub_blocks()?;
        let indices = lzw::decompress(&data_stream, lzw_code_size)?;

        let expected = usize::from(width) * usize::from(height);
        if indices.len() != expected {
            return Err(ParserError::PixelCountMismatch {
                frame: frame_number,
                expected,
                actual: indices.len(),
            }
            .into());
        }

        let frame = DecodedFrame {
            left,
            top,
            width,
            height,
            delay_cs: graphic_control_extension.map_or(0, |gce| gce.delay_time),
            disposal: graphic_control_extension.and_then(|gce| DisposalMethod::from_u8(gce.disposal_method)),
            transparent_index: graphic_control_extension
                .filter(|gce| gce.transparent_color_flag)
                .map(|gce| gce.transparent_color_index),
            palette,
            has_local_color_table: local_color_table_flag,
            indices: indices.into_boxed_slice(),
        };

        debug!("processed frame {frame_number}: {width}x{height} at ({left}, {top})");
        self.frames.push(frame);
        Ok(())
    }

    fn process_extension(&mut self, label: ExtensionType) -> Result<ParserState> {
        use ExtensionType::*;

        debug!("processing extension type: {:?}", label);
        match label {
            Application => {
                let block_size = self.read_byte()?;
                let header = self.read_bytes(block_size.into())?;
                let application_data = self.read_data_sub_blocks()?;

                if header.as_ref() == b"NETSCAPE2.0" && application_data.len() == 3 && application_data[0] == 1 {
                    let loop_number = u16::from_le_bytes([application_data[1], application_data[2]]);
                    self.loop_count = Some(LoopCount::from_u16(loop_number));
                    debug!("processed loop extension, got {:?}", self.loop_count);
                }
                Ok(ParserState::DetermineNextBlock(None))
            }
            Comment => {
                let data = self.read_data_sub_blocks()?;
                self.comments.push(String::from_utf8_lossy(&data).into_owned());
                Ok(ParserState::DetermineNextBlock(None))
            }
            GraphicControl => {
                let block_size = self.read_byte()?;
                let block = self.read_bytes(block_size.into())?;
                // anything after the fixed fields would be sub-blocks; consume them
                self.read_data_sub_blocks()?;

                let &[packed_fields, delay_low, delay_high, transparent_color_index, ..] = block.as_ref() else {
                    return Err(ParserError::ShortGraphicControl(block.len()).into());
                };

                // packed fields definition
                // XXXYYYZW
                // XXX = reserved, not needed
                // YYY = disposal method, indicates what to do with graphic after displaying
                // Z = user input flag
                // W = transparent color flag
                let graphic_control_extension = GraphicControlExtension {
                    disposal_method: (packed_fields >> 2) & 0b00000111,
                    transparent_color_flag: packed_fields & 0b00000001 != 0,
                    delay_time: u16::from_le_bytes([delay_low, delay_high]),
                    transparent_color_index,
                };

                debug!("processed GraphicControlExtension: {:?}", graphic_control_extension);

                Ok(ParserState::DetermineNextBlock(Some(graphic_control_extension)))
            }
            PlainText => {
                let block_size = self.read_byte()?;
                self.read_bytes(block_size.into())?;
                self.read_data_sub_blocks()?;

                Ok(ParserState::DetermineNextBlock(None))
            }
        }
    }

    fn read_bytes(&mut self, count: usize) -> Result<Box<[u8]>> {
        let mut buffer = vec![0; count];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer: [u8; 1] = [0; 1];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        // Unless otherwise stated, multi-byte numeric fields are ordered with the Least
        // Significant Byte first.
        let mut buffer: [u8; 2] = [0; 2];
        self.inner.read_exact(&mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    fn read_data_sub_blocks(&mut self) -> Result<Box<[u8]>> {
        let mut block_size = self.read_byte()?;
        let mut result = Vec::with_capacity(block_size.into());

        // we might have read the block terminator at the end of the while loop, stop right there
        // because we're done.
        while block_size != 0 {
            let mut sub_block_buffer = vec![0; block_size.into()];
            self.inner.read_exact(&mut sub_block_buffer)?;
            result.append(&mut sub_block_buffer);

            block_size = self.read_byte()?;
        }

        Ok(result.into_boxed_slice())
    }
}

/// Byte length of the color table announced in the low three bits of a
/// packed field.
fn color_table_len(packed_fields: u8) -> usize {
    3 * (1 << ((packed_fields & 0b00000111) + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_animation, FrameTiming, GifWriter};

    fn encode(frames: &[Vec<u8>], size: u32, fps: i64) -> Vec<u8> {
        let mut writer = GifWriter::new();
        encode_animation(Some(&mut writer), frames, size, &FrameTiming::from_fps(fps))
            .unwrap()
            .bytes
    }

    #[test]
    fn reads_back_encoded_animation() {
        let red = [0xff, 0, 0, 0xff].repeat(16);
        let blue = [0, 0, 0xff, 0xff].repeat(16);
        let bytes = encode(&[red.clone(), blue.clone()], 4, 10);

        let mut cursor = std::io::Cursor::new(bytes);
        let mut decoder = Decoder::new(&mut cursor);
        decoder.parse().unwrap();

        assert_eq!(decoder.screen_size(), (4, 4));
        assert_eq!(decoder.loop_count(), Some(LoopCount::Infinite));
        assert_eq!(decoder.frames().len(), 2);

        for (frame, source) in decoder.frames().iter().zip([red, blue]) {
            assert_eq!(frame.delay_cs, 10);
            assert_eq!(frame.disposal, Some(DisposalMethod::Unspecified));
            assert_eq!(frame.transparent_index, None);
            assert!(frame.has_local_color_table);
            assert_eq!(frame.palette.as_ref(), &[0xff, 0, 0, 0, 0, 0xff]);
            assert_eq!(frame.to_rgba(), source);
        }
        assert_eq!(decoder.frames()[0].indices.as_ref(), &[0; 16]);
        assert_eq!(decoder.frames()[1].indices.as_ref(), &[1; 16]);
    }

    #[test]
    fn reads_back_transparency() {
        let mut frame = [10, 20, 30, 255].repeat(9);
        frame[4 * 4 + 3] = 3;
        let bytes = encode(&[frame.clone()], 3, 24);

        let mut cursor = std::io::Cursor::new(bytes);
        let mut decoder = Decoder::new(&mut cursor);
        decoder.parse().unwrap();

        let decoded = &decoder.frames()[0];
        assert_eq!(decoded.transparent_index, Some(0));
        assert_eq!(decoded.disposal, Some(DisposalMethod::RestoreToBackgroundColor));
        assert_eq!(decoded.delay_cs, 4);

        frame[4 * 4..4 * 4 + 4].copy_from_slice(&[0, 0, 0, 0]);
        assert_eq!(decoded.to_rgba(), frame);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut cursor = std::io::Cursor::new(b"PNG89a".to_vec());
        let mut decoder = Decoder::new(&mut cursor);
        let err = decoder.parse().unwrap_err();
        assert_eq!(err.downcast_ref::<ParserError>(), Some(&ParserError::InvalidSignature));
    }

    #[test]
    fn reads_global_color_table_and_comments() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"GIF87a");
        // 2x1 screen, global table of 2 entries
        bytes.extend_from_slice(&[2, 0, 1, 0, 0b10000000, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
        bytes.extend_from_slice(&[0x21, 0xfe, 2, b'h', b'i', 0]);
        bytes.extend_from_slice(&[0x2c, 0, 0, 0, 0, 2, 0, 1, 0, 0]);
        bytes.push(2);
        let data = crate::encoder::lzw::compress(2, &[1, 0]).unwrap();
        bytes.push(data.len() as u8);
        bytes.extend_from_slice(&data);
        bytes.extend_from_slice(&[0, 0x3b]);

        let mut cursor = std::io::Cursor::new(bytes);
        let mut decoder = Decoder::new(&mut cursor);
        decoder.parse().unwrap();

        assert_eq!(decoder.comments(), &["hi".to_string()]);
        assert_eq!(decoder.loop_count(), None);
        let frame = &decoder.frames()[0];
        assert!(!frame.has_local_color_table);
        assert_eq!(frame.disposal, None);
        assert_eq!(frame.to_rgba(), vec![255, 255, 255, 255, 0, 0, 0, 255]);
    }
}
