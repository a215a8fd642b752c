use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{error, info, warn};

use crate::encoder::{encode_animation, ContainerWriter, EncodeError, FrameTiming, GIF_MIME_TYPE};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle = 0,
    Encoding = 1,
}

/// Snapshot of everything one export needs, taken before the job yields.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub frames: Vec<Vec<u8>>,
    pub size: u32,
    pub timing: FrameTiming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Exported { fps: u32 },
    NoFrames,
    TooManyColors { limit: usize, transparency: bool },
    WriterUnavailable,
    Failed,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::Exported { fps } => write!(f, "GIF exported ({fps} FPS)."),
            ExportStatus::NoFrames => write!(f, "No frames to export."),
            ExportStatus::TooManyColors { limit, transparency: true } => {
                write!(f, "Too many colors for GIF palette (max. {limit} with transparency).")
            }
            ExportStatus::TooManyColors { limit, transparency: false } => {
                write!(f, "Too many colors for GIF palette (max. {limit}).")
            }
            ExportStatus::WriterUnavailable => write!(f, "GIF writer not available."),
            ExportStatus::Failed => write!(f, "GIF export failed."),
        }
    }
}

#[derive(Debug)]
pub enum ExportOutcome {
    /// Another export was in flight; nothing was done.
    Busy,
    Finished {
        status: ExportStatus,
        payload: Option<ExportPayload>,
    },
}

#[derive(Debug)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Runs GIF exports one at a time.
///
/// `export` takes the `Idle -> Encoding` transition up front and refuses to
/// start while another job holds it. The transition back to `Idle` happens
/// on drop of the guard, so it also runs on errors, panics and cancelled
/// futures.
pub struct ExportController<W> {
    state: AtomicU8,
    writer: Mutex<Option<W>>,
}

struct EncodingGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for EncodingGuard<'_> {
    fn drop(&mut self) {
        self.state.store(ExportState::Idle as u8, Ordering::Release);
    }
}

impl<W: ContainerWriter> ExportController<W> {
    pub fn new(writer: W) -> Self {
        Self::with_writer(Some(writer))
    }

    pub fn with_writer(writer: Option<W>) -> Self {
        Self {
            state: AtomicU8::new(ExportState::Idle as u8),
            writer: Mutex::new(writer),
        }
    }

    pub fn state(&self) -> ExportState {
        match self.state.load(Ordering::Acquire) {
            0 => ExportState::Idle,
            _ => ExportState::Encoding,
        }
    }

    fn try_begin(&self) -> Option<EncodingGuard<'_>> {
        self.state
            .compare_exchange(
                ExportState::Idle as u8,
                ExportState::Encoding as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| EncodingGuard { state: &self.state })
    }

    pub async fn export(&self, job: ExportJob) -> ExportOutcome {
        if job.frames.is_empty() {
            return finished(ExportStatus::NoFrames, None);
        }

        let Some(_guard) = self.try_begin() else {
            warn!("export requested while another export is running, ignoring");
            return ExportOutcome::Busy;
        };

        // let the host render its "working" state before the CPU bound part
        tokio::task::yield_now().await;

        info!("exporting {} frames of {}x{} at {} fps", job.frames.len(), job.size, job.size, job.timing.fps());

        // a writer left poisoned by a panicking job starts over on `begin`
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| {
            warn!("previous export panicked, reusing the GIF writer");
            PoisonError::into_inner(poisoned)
        });
        let result = encode_animation(writer.as_mut(), &job.frames, job.size, &job.timing);
        drop(writer);

        match result {
            Ok(encoded) => {
                info!(
                    "GIF export produced {} bytes: {} frames, {} palette entries, transparent index {:?}",
                    encoded.bytes.len(),
                    encoded.frame_count,
                    encoded.palette_len,
                    encoded.transparent_index
                );
                finished(
                    ExportStatus::Exported { fps: job.timing.fps() },
                    Some(ExportPayload {
                        bytes: encoded.bytes,
                        mime_type: GIF_MIME_TYPE,
                    }),
                )
            }
            Err(EncodeError::EmptyInput) => finished(ExportStatus::NoFrames, None),
            Err(EncodeError::EncoderUnavailable) => {
                error!("GIF export failed: {}", EncodeError::EncoderUnavailable);
                finished(ExportStatus::WriterUnavailable, None)
            }
            Err(EncodeError::PaletteOverflow { limit, transparency, found }) => {
                warn!("GIF export refused: {found} colors, limit {limit}");
                finished(ExportStatus::TooManyColors { limit, transparency }, None)
            }
            Err(err) => {
                error!("GIF export failed: {err}");
                finished(ExportStatus::Failed, None)
            }
        }
    }
}

fn finished(status: ExportStatus, payload: Option<ExportPayload>) -> ExportOutcome {
    ExportOutcome::Finished { status, payload }
}
