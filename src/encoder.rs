mod assembler;
mod bit_writer;
mod gif_writer;
pub(crate) mod lzw;
mod palette;
mod timing;

pub use assembler::{encode_animation, ContainerError, ContainerWriter, EncodeError, FrameBlock};
pub use gif_writer::GifWriter;
pub use timing::FrameTiming;

#[cfg(test)]
pub(crate) use assembler::tests::RecordingWriter;

pub const GIF_MIME_TYPE: &str = "image/gif";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    Unspecified = 0,
    DoNotDispose = 1,
    RestoreToBackgroundColor = 2,
    RestoreToPrevious = 3,
}

impl DisposalMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisposalMethod::Unspecified),
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackgroundColor),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    Number(u16),
}

impl LoopCount {
    /// Value stored in the NETSCAPE2.0 extension, where 0 means forever.
    pub fn as_u16(self) -> u16 {
        match self {
            LoopCount::Infinite => 0,
            LoopCount::Number(number) => number,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => LoopCount::Infinite,
            number => LoopCount::Number(number),
        }
    }
}
