use log::warn;

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 24;
pub const DEFAULT_FPS: u32 = 5;

/// Playback rate and the two delay representations derived from it.
///
/// The fields are only ever produced together from one fps value, so the
/// preview delay and the container delay cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    fps: u32,
    delay_ms: u32,
    delay_cs: u16,
}

impl FrameTiming {
    pub fn from_fps(fps: i64) -> Self {
        let fps = fps.clamp(i64::from(MIN_FPS), i64::from(MAX_FPS)) as u32;
        let delay_ms = (1000.0 / f64::from(fps)).round() as u32;
        let delay_cs = ((f64::from(delay_ms) / 10.0).round() as u16).max(1);

        Self { fps, delay_ms, delay_cs }
    }

    /// Reads a user supplied rate. Missing or non-numeric input falls back
    /// to [`DEFAULT_FPS`]; numbers are clamped to `MIN_FPS..=MAX_FPS`.
    ///
    /// Like a form field, only the leading integer is taken into account, so
    /// `"12fps"` reads as 12.
    pub fn parse(input: Option<&str>) -> Self {
        match input.and_then(leading_integer) {
            Some(fps) => Self::from_fps(fps),
            None => {
                if let Some(input) = input {
                    warn!("frame rate {input:?} is not a number, using {DEFAULT_FPS} fps");
                }
                Self::from_fps(i64::from(DEFAULT_FPS))
            }
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Delay for on-screen preview playback.
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Delay stored in each frame's graphic control extension.
    pub fn delay_cs(&self) -> u16 {
        self.delay_cs
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::from_fps(i64::from(DEFAULT_FPS))
    }
}

fn leading_integer(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let digits_start = usize::from(trimmed.starts_with(['-', '+']));
    let digits_end = trimmed[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed.len(), |end| end + digits_start);

    if digits_end == digits_start {
        return None;
    }

    // saturate instead of failing on absurdly long inputs, they clamp anyway
    match trimmed[..digits_end].parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if trimmed.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}
