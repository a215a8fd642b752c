use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, warn};
use thiserror::Error;

/// Largest side length an exported animation may have.
pub const MAX_EXPORT_SIZE: u32 = 512;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("no frames were given")]
    NoFrames,

    #[error("failed to load frame {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("frame {} is {width}x{height}, frames have to be square", .path.display())]
    NonSquare { path: PathBuf, width: u32, height: u32 },

    #[error("frame {} is {actual}x{actual}, the first frame is {expected}x{expected}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
}

/// Frames as RGBA8 buffers, all `size * size` pixels.
#[derive(Debug)]
pub struct LoadedFrames {
    pub frames: Vec<Vec<u8>>,
    pub size: u32,
}

/// Reduces `scale` until `size * scale` fits the export cap. Never below 1.
pub fn effective_scale(size: u32, scale: u32) -> u32 {
    let fitting = (MAX_EXPORT_SIZE / size.max(1)).max(1);
    scale.clamp(1, fitting)
}

/// Loads square frames of equal size and upscales them with nearest
/// neighbour sampling so pixel art stays crisp.
pub fn load_frames<P: AsRef<Path>>(paths: &[P], scale: u32) -> Result<LoadedFrames, FrameSourceError> {
    let mut images = Vec::with_capacity(paths.len());
    let mut side = None;

    for path in paths {
        let path = path.as_ref();
        let image = load_rgba(path)?;
        let (width, height) = image.dimensions();

        if width != height {
            return Err(FrameSourceError::NonSquare {
                path: path.to_path_buf(),
                width,
                height,
            });
        }

        match side {
            None => side = Some(width),
            Some(expected) if expected != width => {
                return Err(FrameSourceError::SizeMismatch {
                    path: path.to_path_buf(),
                    expected,
                    actual: width,
                })
            }
            Some(_) => {}
        }

        debug!("loaded frame {} ({width}x{height})", path.display());
        images.push(image);
    }

    let Some(side) = side else {
        return Err(FrameSourceError::NoFrames);
    };

    let applied = effective_scale(side, scale);
    if applied != scale {
        warn!("scale {scale} would exceed {MAX_EXPORT_SIZE}px, using {applied}");
    }
    let size = side * applied;

    let frames = images
        .into_iter()
        .map(|image| {
            if applied == 1 {
                image.into_raw()
            } else {
                imageops::resize(&image, size, size, FilterType::Nearest).into_raw()
            }
        })
        .collect();

    Ok(LoadedFrames { frames, size })
}

fn load_rgba(path: &Path) -> Result<RgbaImage, FrameSourceError> {
    image::open(path)
        .map(|image| image.to_rgba8())
        .map_err(|source| FrameSourceError::Image {
            path: path.to_path_buf(),
            source,
        })
}
