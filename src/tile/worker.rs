//! Background region decoding.
//!
//! Each missing tile is decoded by its own task on the runtime's blocking
//! pool. Workers never touch tile state; they report a [`Completion`] back to
//! the coordination thread, which applies it.
//!
//! ```text
//!  coordination thread                        blocking pool
//!  ───────────────────                        ─────────────
//!  request_tiles ──▶ mark Loading ──spawn──▶  disposed? still needed?
//!                                              │ no          │ yes
//!                                              ▼             ▼
//!                                            Skipped    to_raw_rect + decode
//!                                              │             │
//!  apply completion ◀────── channel ───────────┴─────────────┘
//!    recheck still needed, store or release
//! ```
//!
//! # Staleness
//!
//! A tile is *still needed* while the last request targets its sample size and
//! the last viewport intersects it. Workers check this before decoding and the
//! coordination thread checks again before storing, so a decode superseded by
//! a newer request is dropped rather than overwriting newer state.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::source::{PixelBuffer, PixelFormat, RegionDecoder};

use super::grid::TileId;
use super::orientation::OrientationCorrector;
use super::rect::Rect;

// =============================================================================
// Shared State
// =============================================================================

/// The most recent viewport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastRequest {
    /// Sample size of the request; 0 before the first request
    pub level: u32,

    /// Viewport in logical image coordinates
    pub rect: Rect,
}

impl LastRequest {
    /// Whether a tile of `level` covering `rect` is relevant to this request.
    pub fn wants(&self, level: u32, rect: &Rect) -> bool {
        self.level == level && self.rect.intersects(rect)
    }
}

/// State read by workers and written by the coordination thread.
pub(crate) struct Shared {
    disposed: AtomicBool,

    /// Level and viewport are replaced together under one lock
    last_request: Mutex<LastRequest>,

    /// Emptied on teardown; workers clone the handle before decoding
    decoder: Mutex<Option<Arc<dyn RegionDecoder>>>,
}

impl Shared {
    pub(crate) fn new(decoder: Arc<dyn RegionDecoder>) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            last_request: Mutex::new(LastRequest::default()),
            decoder: Mutex::new(Some(decoder)),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn last_request(&self) -> LastRequest {
        *self.last_request.lock()
    }

    pub(crate) fn set_last_request(&self, request: LastRequest) {
        *self.last_request.lock() = request;
    }

    pub(crate) fn still_needed(&self, level: u32, rect: &Rect) -> bool {
        self.last_request.lock().wants(level, rect)
    }

    /// Decoder handle, or `None` once torn down.
    fn decoder(&self) -> Option<Arc<dyn RegionDecoder>> {
        if self.is_disposed() {
            return None;
        }
        self.decoder.lock().clone()
    }

    /// Mark as disposed and drop the shared decoder handle.
    ///
    /// A worker already inside `decode_region` keeps its own handle until it
    /// returns; no new decode starts afterwards.
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.decoder.lock().take();
    }
}

// =============================================================================
// Jobs and Completions
// =============================================================================

/// Everything a worker needs to decode one tile.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodeJob {
    pub id: TileId,
    /// Epoch of the grid the tile belongs to
    pub epoch: u64,
    /// Tile bounds in logical coordinates
    pub rect: Rect,
    pub corrector: OrientationCorrector,
    pub format: Option<PixelFormat>,
}

/// What happened to a dispatched decode.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Not decoded: torn down or no longer needed
    Skipped,
    Decoded(PixelBuffer),
    Failed { raw_rect: Rect, error: DecodeError },
}

/// Result of one worker task, delivered to the coordination thread.
#[derive(Debug)]
pub(crate) struct Completion {
    pub job: DecodeJob,
    pub outcome: Outcome,
}

/// Run `job` on the blocking pool of `runtime`.
pub(crate) fn dispatch(
    runtime: &Handle,
    shared: Arc<Shared>,
    job: DecodeJob,
    completions: UnboundedSender<Completion>,
) {
    runtime.spawn_blocking(move || {
        let outcome = decode(&shared, &job);
        if completions.send(Completion { job, outcome }).is_err() {
            // Receiver is gone after teardown; any buffer is dropped here
            debug!(level = job.id.level, index = job.id.index, "Dropped completion after teardown");
        }
    });
}

fn decode(shared: &Shared, job: &DecodeJob) -> Outcome {
    if !shared.still_needed(job.id.level, &job.rect) {
        return Outcome::Skipped;
    }
    let Some(decoder) = shared.decoder() else {
        return Outcome::Skipped;
    };

    let raw_rect = job.corrector.to_raw_rect(&job.rect);
    // A panicking decoder must still report back, or the tile stays Loading
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        decoder.decode_region(raw_rect, job.id.level, job.format)
    }));
    match result {
        Ok(Ok(buffer)) => Outcome::Decoded(buffer),
        Ok(Err(error)) => Outcome::Failed { raw_rect, error },
        Err(panic_info) => {
            let message = panic_message(panic_info.as_ref());
            warn!(panic = %message, rect = %raw_rect, "Region decoder panicked");
            Outcome::Failed {
                raw_rect,
                error: DecodeError::new(format!("decoder panicked: {message}")),
            }
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
