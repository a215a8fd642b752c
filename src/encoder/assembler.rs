use log::{debug, info};
use thiserror::Error;

use super::lzw::{self, LzwError};
use super::palette::{build_palette, IndexedAnimation, Palette};
use super::{DisposalMethod, FrameTiming, LoopCount};

/// Room for header, logical screen descriptor and the loop extension.
const FIXED_OVERHEAD: usize = 2048;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("no frames to encode")]
    EmptyInput,

    #[error("GIF container writer is not available")]
    EncoderUnavailable,

    #[error("too many colors for GIF palette: {found} found, max. {limit}{}", transparency_note(.transparency))]
    PaletteOverflow {
        limit: usize,
        transparency: bool,
        found: usize,
    },

    #[error("frame {index} holds {actual} bytes of RGBA data, expected {expected}")]
    FrameSize {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("frame dimension {0} is outside 1..=65535")]
    InvalidDimension(u32),

    #[error(transparent)]
    Lzw(#[from] LzwError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

fn transparency_note(transparency: &bool) -> &'static str {
    if *transparency {
        " with transparency"
    } else {
        ""
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContainerError {
    #[error("a frame was written before the animation was started")]
    NotStarted,

    #[error("frame at ({left}, {top}) sized {width}x{height} does not fit the {screen_width}x{screen_height} screen")]
    FrameOutOfBounds {
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        screen_width: u16,
        screen_height: u16,
    },

    #[error("frame of {width}x{height} pixels comes with {actual} indices")]
    IndexCount { width: u16, height: u16, actual: usize },

    #[error("color table of {0} bytes is not 3 * 2^n entries with 1 <= n <= 8")]
    PaletteSize(usize),
}

/// Everything the container needs for one image block. `indices` is the
/// raw indexed frame; `lzw_data` is the same frame already compressed with
/// `min_code_size`.
#[derive(Debug)]
pub struct FrameBlock<'a> {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: &'a [u8],
    pub min_code_size: u8,
    pub lzw_data: &'a [u8],
    /// Flat `r, g, b` color table.
    pub palette: &'a [u8],
    pub delay_cs: u16,
    pub disposal: DisposalMethod,
    pub transparent_index: Option<u8>,
}

/// Byte level animated image container.
///
/// `begin` hands over a pre-sized working buffer; `finish` gives it back with
/// the offset one past the last byte written.
pub trait ContainerWriter {
    fn begin(&mut self, buffer: Vec<u8>, width: u16, height: u16, loop_count: LoopCount) -> Result<(), ContainerError>;

    fn add_frame(&mut self, frame: &FrameBlock<'_>) -> Result<(), ContainerError>;

    fn finish(&mut self) -> Result<(Vec<u8>, usize), ContainerError>;
}

#[derive(Debug)]
pub struct EncodedAnimation {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub palette_len: usize,
    pub transparent_index: Option<u8>,
}

/// Encodes RGBA frames of `size`x`size` pixels into one looping animation.
///
/// Fails before touching any pixel data when there is nothing to encode or
/// no writer to encode into.
pub fn encode_animation<B, W>(
    writer: Option<&mut W>,
    frames: &[B],
    size: u32,
    timing: &FrameTiming,
) -> Result<EncodedAnimation, EncodeError>
where
    B: AsRef<[u8]>,
    W: ContainerWriter + ?Sized,
{
    if frames.is_empty() {
        return Err(EncodeError::EmptyInput);
    }
    let writer = writer.ok_or(EncodeError::EncoderUnavailable)?;

    let animation = build_palette(frames, size)?;
    let bytes = assemble(writer, &animation, timing.delay_cs())?;

    Ok(EncodedAnimation {
        bytes,
        frame_count: animation.frames.len(),
        palette_len: animation.palette.len(),
        transparent_index: animation.transparent_index,
    })
}

/// Drives the container writer over every indexed frame and trims the
/// working buffer to what was actually written.
pub fn assemble<W>(writer: &mut W, animation: &IndexedAnimation, delay_cs: u16) -> Result<Vec<u8>, EncodeError>
where
    W: ContainerWriter + ?Sized,
{
    let side = u16::try_from(animation.size).map_err(|_| EncodeError::InvalidDimension(animation.size))?;
    let palette = animation.palette.to_rgb_table();
    let min_code_size = animation.palette.min_code_size();

    let disposal = if animation.transparent_index.is_some() {
        DisposalMethod::RestoreToBackgroundColor
    } else {
        DisposalMethod::Unspecified
    };

    let buffer = vec![0; buffer_bound(animation.size, animation.frames.len(), &animation.palette)];
    writer.begin(buffer, side, side, LoopCount::Infinite)?;

    for (i, indices) in animation.frames.iter().enumerate() {
        let lzw_data = lzw::compress(min_code_size, indices)?;
        debug!("frame {i}: {} indices compressed to {} bytes", indices.len(), lzw_data.len());

        writer.add_frame(&FrameBlock {
            left: 0,
            top: 0,
            width: side,
            height: side,
            indices,
            min_code_size,
            lzw_data: &lzw_data,
            palette: &palette,
            delay_cs,
            disposal,
            transparent_index: animation.transparent_index,
        })?;
    }

    let (mut bytes, end) = writer.finish()?;
    bytes.truncate(end);

    info!("encoded {} frames of {side}x{side} into {} bytes", animation.frames.len(), bytes.len());
    Ok(bytes)
}

/// Generous upper bound for the working buffer, not a tight estimate.
fn buffer_bound(size: u32, frame_count: usize, palette: &Palette) -> usize {
    let pixels = size as usize * size as usize;
    pixels * frame_count * 2 + palette.len() * 4 + FIXED_OVERHEAD
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoder::palette::Rgb;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct RecordedFrame {
        pub rect: (u16, u16, u16, u16),
        pub indices: Vec<u8>,
        pub min_code_size: u8,
        pub palette: Vec<u8>,
        pub delay_cs: u16,
        pub disposal: DisposalMethod,
        pub transparent_index: Option<u8>,
    }

    /// Records calls instead of producing a real container.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingWriter {
        pub begun: Option<(u16, u16, LoopCount, usize)>,
        pub frames: Vec<RecordedFrame>,
        pub finished: bool,
        buffer: Vec<u8>,
    }

    impl ContainerWriter for RecordingWriter {
        fn begin(&mut self, buffer: Vec<u8>, width: u16, height: u16, loop_count: LoopCount) -> Result<(), ContainerError> {
            self.begun = Some((width, height, loop_count, buffer.len()));
            self.buffer = buffer;
            Ok(())
        }

        fn add_frame(&mut self, frame: &FrameBlock<'_>) -> Result<(), ContainerError> {
            self.frames.push(RecordedFrame {
                rect: (frame.left, frame.top, frame.width, frame.height),
                indices: frame.indices.to_vec(),
                min_code_size: frame.min_code_size,
                palette: frame.palette.to_vec(),
                delay_cs: frame.delay_cs,
                disposal: frame.disposal,
                transparent_index: frame.transparent_index,
            });
            Ok(())
        }

        fn finish(&mut self) -> Result<(Vec<u8>, usize), ContainerError> {
            self.finished = true;
            // pretend one byte per frame was written
            Ok((std::mem::take(&mut self.buffer), self.frames.len()))
        }
    }

    fn solid(size: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.repeat((size * size) as usize)
    }

    #[test]
    fn red_and_blue_at_ten_fps() {
        let frames = [solid(4, [0xff, 0, 0, 0xff]), solid(4, [0, 0, 0xff, 0xff])];
        let mut writer = RecordingWriter::default();

        let encoded = encode_animation(Some(&mut writer), &frames, 4, &FrameTiming::from_fps(10)).unwrap();

        assert_eq!(encoded.palette_len, 2);
        assert_eq!(encoded.transparent_index, None);
        assert_eq!(encoded.frame_count, 2);
        assert_eq!(encoded.bytes.len(), 2);

        let (width, height, loop_count, capacity) = writer.begun.unwrap();
        assert_eq!((width, height, loop_count), (4, 4, LoopCount::Infinite));
        assert_eq!(capacity, 16 * 2 * 2 + 2 * 4 + FIXED_OVERHEAD);

        assert_eq!(writer.frames.len(), 2);
        for (frame, index) in writer.frames.iter().zip([0u8, 1]) {
            assert_eq!(frame.rect, (0, 0, 4, 4));
            assert_eq!(frame.indices, vec![index; 16]);
            assert_eq!(frame.palette, vec![0xff, 0, 0, 0, 0, 0xff]);
            assert_eq!(frame.delay_cs, 10);
            assert_eq!(frame.disposal, DisposalMethod::Unspecified);
            assert_eq!(frame.transparent_index, None);
            assert_eq!(frame.min_code_size, 2);
        }
        assert!(writer.finished);
    }

    #[test]
    fn transparency_switches_disposal() {
        let mut frame = solid(2, [1, 2, 3, 255]);
        frame[3] = 0;
        let mut writer = RecordingWriter::default();

        let encoded = encode_animation(Some(&mut writer), &[frame], 2, &FrameTiming::from_fps(24)).unwrap();

        assert_eq!(encoded.transparent_index, Some(0));
        let recorded = &writer.frames[0];
        assert_eq!(recorded.disposal, DisposalMethod::RestoreToBackgroundColor);
        assert_eq!(recorded.transparent_index, Some(0));
        assert_eq!(recorded.delay_cs, 4);
        assert_eq!(recorded.indices, vec![0, 1, 1, 1]);
        assert_eq!(recorded.palette, vec![0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn palette_order_is_preserved_in_flat_table() {
        let frame: Vec<u8> = [[5, 5, 5, 255], [200, 100, 50, 255], [0, 0, 0, 255], [5, 5, 5, 255]].concat();
        let animation = build_palette(&[frame], 2).unwrap();
        assert_eq!(
            animation.palette.colors()[..3],
            [Rgb::new(5, 5, 5), Rgb::new(200, 100, 50), Rgb::BLACK]
        );

        let mut writer = RecordingWriter::default();
        assemble(&mut writer, &animation, 7).unwrap();
        assert_eq!(writer.frames[0].palette, animation.palette.to_rgb_table());
        assert_eq!(writer.frames[0].palette[..9], [5, 5, 5, 200, 100, 50, 0, 0, 0]);
    }

    #[test]
    fn empty_input_never_reaches_writer() {
        let frames: Vec<Vec<u8>> = Vec::new();
        let mut writer = RecordingWriter::default();

        let err = encode_animation(Some(&mut writer), &frames, 4, &FrameTiming::default()).unwrap_err();

        assert!(matches!(err, EncodeError::EmptyInput));
        assert!(writer.begun.is_none());
        assert!(writer.frames.is_empty());
    }

    #[test]
    fn missing_writer_fails_before_encoding() {
        // would overflow the palette if it were ever scanned
        let frames = [(0..=255u8).flat_map(|i| [i, i, 1, 255]).chain([9, 9, 9, 255]).collect::<Vec<u8>>()];

        let err = encode_animation::<_, RecordingWriter>(None, &frames, 3, &FrameTiming::default()).unwrap_err();
        assert!(matches!(err, EncodeError::EncoderUnavailable));
    }

    #[test]
    fn overflow_is_reported_without_writer_calls() {
        let frame: Vec<u8> = (0..257u32).flat_map(|i| [(i & 0xff) as u8, (i >> 8) as u8, 0, 255]).collect();
        let padded: Vec<u8> = frame.iter().copied().chain(std::iter::repeat(0).take((17 * 17 - 257) * 4)).collect();
        let mut writer = RecordingWriter::default();

        let err = encode_animation(Some(&mut writer), &[padded], 17, &FrameTiming::default()).unwrap_err();

        assert_eq!(err.to_string(), "too many colors for GIF palette: 257 found, max. 255 with transparency");
        assert!(writer.begun.is_none());
    }
}
