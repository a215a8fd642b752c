use std::collections::HashMap;

use log::debug;

use super::EncodeError;

/// Pixels with alpha below this are dropped to the transparent index.
pub const ALPHA_THRESHOLD: u8 = 16;

pub const MAX_PALETTE_LEN: usize = 256;

const BYTES_PER_PIXEL: usize = 4;

// Working value for transparent pixels before the final index shift.
const TRANSPARENT: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Ordered, power of two sized color table. Index order is first occurrence
/// order and must line up with the indexed frames it was built alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Box<[Rgb]>,
}

impl Palette {
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Flat `r, g, b` triplets in index order.
    pub fn to_rgb_table(&self) -> Vec<u8> {
        self.colors().iter().flat_map(|color| [color.r, color.g, color.b]).collect()
    }

    /// Number of bits needed to address every entry.
    pub fn bits(&self) -> u8 {
        self.colors.len().trailing_zeros() as u8
    }

    /// LZW minimum code size for frames indexed into this palette. GIF
    /// decoders do not accept anything below 2.
    pub fn min_code_size(&self) -> u8 {
        self.bits().max(2)
    }
}

/// Result of palette construction: a shared palette and one indexed frame
/// per input buffer.
#[derive(Debug, Clone)]
pub struct IndexedAnimation {
    pub palette: Palette,
    pub frames: Vec<Box<[u8]>>,
    /// Always `Some(0)` when any pixel was transparent.
    pub transparent_index: Option<u8>,
    pub size: u32,
}

/// Deduplicates the exact RGB colors of every frame into one palette and
/// maps each pixel to its palette index.
///
/// Frames are scanned in order, pixels row-major. No quantisation happens:
/// more distinct colors than the palette can hold is an error. When any
/// pixel is transparent, index 0 becomes a black placeholder that stands
/// for "transparent" and every color index moves up by one.
pub fn build_palette<B: AsRef<[u8]>>(frames: &[B], size: u32) -> Result<IndexedAnimation, EncodeError> {
    if frames.is_empty() {
        return Err(EncodeError::EmptyInput);
    }
    if size == 0 || size > u32::from(u16::MAX) {
        return Err(EncodeError::InvalidDimension(size));
    }

    let pixel_count = size as usize * size as usize;
    let expected = pixel_count * BYTES_PER_PIXEL;

    let mut colors: Vec<Rgb> = Vec::new();
    let mut lookup: HashMap<Rgb, u16> = HashMap::new();
    let mut needs_transparency = false;
    let mut working: Vec<Vec<u16>> = Vec::with_capacity(frames.len());

    for (index, frame) in frames.iter().enumerate() {
        let buffer = frame.as_ref();
        if buffer.len() != expected {
            return Err(EncodeError::FrameSize { index, expected, actual: buffer.len() });
        }

        let indices = buffer
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|pixel| {
                if pixel[3] < ALPHA_THRESHOLD {
                    needs_transparency = true;
                    return TRANSPARENT;
                }

                let color = Rgb::new(pixel[0], pixel[1], pixel[2]);
                *lookup.entry(color).or_insert_with(|| {
                    colors.push(color);
                    (colors.len() - 1) as u16
                })
            })
            .collect();

        working.push(indices);
    }

    let limit = if needs_transparency { MAX_PALETTE_LEN - 1 } else { MAX_PALETTE_LEN };
    if colors.len() > limit {
        return Err(EncodeError::PaletteOverflow {
            limit,
            transparency: needs_transparency,
            found: colors.len(),
        });
    }

    debug!("found {} distinct colors across {} frames, transparency: {needs_transparency}", colors.len(), frames.len());

    let (mut entries, transparent_index, shift) = if needs_transparency {
        let mut entries = Vec::with_capacity(colors.len() + 1);
        entries.push(Rgb::BLACK);
        entries.extend_from_slice(&colors);
        (entries, Some(0u8), 1)
    } else {
        (colors, None, 0)
    };

    // the limit check above keeps every shifted index within u8
    let frames = working
        .into_iter()
        .map(|indices| {
            indices
                .into_iter()
                .map(|index| if index == TRANSPARENT { 0 } else { (index + shift) as u8 })
                .collect::<Box<[u8]>>()
        })
        .collect();

    let padded_len = entries.len().next_power_of_two().max(2);
    entries.resize(padded_len, Rgb::BLACK);

    Ok(IndexedAnimation {
        palette: Palette { colors: entries.into_boxed_slice() },
        frames,
        transparent_index,
        size,
    })
}
