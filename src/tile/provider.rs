//! Tile provider: the coordinator for incremental tile loading.
//!
//! The provider is the single entry point a viewer talks to. For every
//! viewport update it:
//! - Picks a sample size from the zoom scale
//! - Gets (or creates) the tile grid for that sample size
//! - Records the request so workers can judge staleness
//! - Returns decoded tiles and dispatches decodes for the rest
//! - Evicts other levels once the active level is complete
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        TileProvider                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                   request_tiles()                       │    │
//! │  │  1. Quantize scale    4. Partition hits / misses        │    │
//! │  │  2. Grid for level    5. Dispatch misses                │    │
//! │  │  3. Record request    6. Evict or add fallback tiles    │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    ▲            │
//! │           ▼                    ▼                    │            │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │ decode worker│───▶│ poll_completions │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Coordination Thread
//!
//! The thread that calls [`TileProvider::open`] is the coordination thread.
//! All cache mutation happens there: public methods called from any other
//! thread fail with [`MisuseError::WrongContext`]. Decodes finish on worker
//! threads and are applied only when the coordination thread drains them with
//! [`poll_completions`](TileProvider::poll_completions),
//! [`next_completion`](TileProvider::next_completion) or
//! [`settle`](TileProvider::settle).

use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::error::{MisuseError, TileError};
use crate::source::{ImageSource, PixelBuffer, PixelFormat, RegionDecoder};

use super::cache::{CacheStats, TileCache};
use super::grid::{sample_size_for_scale, TileId};
use super::orientation::{Orientation, OrientationCorrector};
use super::rect::Rect;
use super::worker::{self, Completion, DecodeJob, LastRequest, Outcome, Shared};

/// Callback invoked with the visible tiles whenever a decode is published.
pub type TilesChanged = Box<dyn FnMut(&[TileRef<'_>]) + Send>;

// =============================================================================
// Tile View
// =============================================================================

/// A decoded tile ready for compositing.
///
/// Borrows the provider, so the pixels cannot outlive the next call that might
/// release them.
#[derive(Debug, Clone, Copy)]
pub struct TileRef<'a> {
    id: TileId,
    rect: Rect,
    pixels: &'a PixelBuffer,
}

impl<'a> TileRef<'a> {
    pub fn id(&self) -> TileId {
        self.id
    }

    /// Sample size the pixels were decoded at.
    pub fn level(&self) -> u32 {
        self.id.level
    }

    /// Bounds in logical image coordinates.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn pixels(&self) -> &'a PixelBuffer {
        self.pixels
    }
}

/// Resolve ids to views, skipping any that no longer hold pixels.
fn resolve<'a>(cache: &'a TileCache, ids: &[TileId]) -> Vec<TileRef<'a>> {
    ids.iter()
        .filter_map(|&id| {
            let tile = cache.tile(id)?;
            Some(TileRef {
                id,
                rect: tile.rect(),
                pixels: tile.pixels()?,
            })
        })
        .collect()
}

/// What handling one completion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent {
    /// The tile was stored and the visible list published
    Published(TileId),
    /// The tile was decoded but was stale; the pixels were released
    Discarded(TileId),
    /// The worker skipped the decode
    Skipped(TileId),
}

// =============================================================================
// Tile Provider
// =============================================================================

/// Incrementally decodes the visible tiles of a large image.
pub struct TileProvider {
    /// Thread allowed to call mutating methods
    owner: ThreadId,

    /// Runtime whose blocking pool runs decodes
    runtime: Handle,

    /// State shared with decode workers
    shared: Arc<Shared>,

    corrector: OrientationCorrector,

    cache: TileCache,

    /// Current visible tiles in paint order (first painted underneath)
    hits: Vec<TileId>,

    /// Preferred decode format; `None` lets the decoder choose
    pixel_format: Option<PixelFormat>,

    completions_tx: UnboundedSender<Completion>,

    /// `None` after teardown
    completions_rx: Option<UnboundedReceiver<Completion>>,

    /// Dispatched decodes not yet applied
    in_flight: usize,

    on_tiles_changed: TilesChanged,
}

impl TileProvider {
    /// Open an image source and create a provider bound to the current thread.
    ///
    /// Must be called from within a tokio runtime; decodes run on that
    /// runtime's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Construction`] if the decoder cannot be opened or
    /// reports an empty or oversized image.
    pub async fn open<S, F>(source: S, on_tiles_changed: F) -> Result<Self, TileError>
    where
        S: ImageSource,
        F: FnMut(&[TileRef<'_>]) + Send + 'static,
    {
        let decoder = source.open_decoder().await?;
        Self::with_decoder(decoder, source.orientation(), on_tiles_changed)
    }

    /// Create a provider around an already opened decoder.
    pub fn with_decoder<D, F>(
        decoder: D,
        orientation: Orientation,
        on_tiles_changed: F,
    ) -> Result<Self, TileError>
    where
        D: RegionDecoder + 'static,
        F: FnMut(&[TileRef<'_>]) + Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| TileError::construction(format!("no tokio runtime: {}", e)))?;

        let (raw_width, raw_height) = decoder.dimensions();
        if raw_width == 0 || raw_height == 0 {
            return Err(TileError::construction(format!(
                "image has no pixels ({}x{})",
                raw_width, raw_height
            )));
        }
        let too_large = || {
            TileError::construction(format!(
                "image dimensions {}x{} exceed the supported range",
                raw_width, raw_height
            ))
        };
        let raw_width = i32::try_from(raw_width).map_err(|_| too_large())?;
        let raw_height = i32::try_from(raw_height).map_err(|_| too_large())?;

        let corrector = OrientationCorrector::new(orientation, raw_width, raw_height);
        let (width, height) = corrector.logical_size();
        info!(
            raw_width,
            raw_height,
            width,
            height,
            orientation = orientation.degrees(),
            "Opened tile provider"
        );

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Ok(Self {
            owner: thread::current().id(),
            runtime,
            shared: Arc::new(Shared::new(Arc::new(decoder))),
            corrector,
            cache: TileCache::new(width, height),
            hits: Vec::new(),
            pixel_format: Some(PixelFormat::Rgba8),
            completions_tx,
            completions_rx: Some(completions_rx),
            in_flight: 0,
            on_tiles_changed: Box::new(on_tiles_changed),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Stored rotation of the image.
    pub fn orientation(&self) -> Orientation {
        self.corrector.orientation()
    }

    /// Logical (displayed) image width.
    pub fn width(&self) -> i32 {
        self.corrector.logical_size().0
    }

    /// Logical (displayed) image height.
    pub fn height(&self) -> i32 {
        self.corrector.logical_size().1
    }

    /// Stored image size before orientation correction.
    pub fn raw_size(&self) -> (i32, i32) {
        self.corrector.raw_size()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    /// The last viewport request, if any.
    pub fn last_request(&self) -> Option<LastRequest> {
        let request = self.shared.last_request();
        (request.level != 0).then_some(request)
    }

    /// Ids of the currently visible tiles, in paint order.
    pub fn visible_ids(&self) -> &[TileId] {
        &self.hits
    }

    /// Currently visible tiles, in paint order.
    pub fn visible_tiles(&self) -> Vec<TileRef<'_>> {
        resolve(&self.cache, &self.hits)
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            in_flight: self.in_flight,
            ..self.cache.stats()
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Set the pixel layout requested for future decodes.
    ///
    /// `None` lets the decoder choose the closest match for the image.
    pub fn set_preferred_pixel_format(
        &mut self,
        format: Option<PixelFormat>,
    ) -> Result<(), TileError> {
        self.check_context()?;
        self.check_live()?;
        self.pixel_format = format;
        Ok(())
    }

    /// Return the best tiles available for a viewport and start decoding the
    /// missing ones.
    ///
    /// `viewport` is in logical image coordinates; `viewport_width` and
    /// `viewport_height` are the on-screen size used to size new grids.
    ///
    /// The returned list is in paint order: tiles from other sample sizes come
    /// first so tiles of the active sample size are painted over them.
    /// Returns an empty list once the provider is disposed.
    pub fn request_tiles(
        &mut self,
        scale: f32,
        viewport_width: u32,
        viewport_height: u32,
        viewport: Rect,
    ) -> Result<Vec<TileRef<'_>>, TileError> {
        self.check_context()?;
        if self.is_disposed() {
            return Ok(Vec::new());
        }
        if viewport_width == 0 || viewport_height == 0 {
            return Err(TileError::InvalidViewport {
                width: viewport_width,
                height: viewport_height,
            });
        }

        let level = sample_size_for_scale(scale);
        let epoch = self
            .cache
            .grid_for(level, viewport_width, viewport_height)
            .epoch();

        self.shared.set_last_request(LastRequest {
            level,
            rect: viewport,
        });

        let partition = self.cache.partition(level, &viewport);
        self.hits.clear();
        self.hits.extend_from_slice(&partition.hits);

        for &id in &partition.misses {
            self.load(id, epoch);
        }

        if partition.is_full_hit() {
            let evicted = self.cache.evict_other_levels(level);
            if evicted > 0 {
                debug!(level, evicted, "Full hit, evicted other levels");
            }
        } else {
            // Coarser fallback tiles are painted first, under the active level
            let mut ordered = self.cache.cross_level_hits(level, &viewport);
            ordered.append(&mut self.hits);
            self.hits = ordered;
        }

        Ok(resolve(&self.cache, &self.hits))
    }

    /// Dispatch a decode for `id` unless one is already in flight.
    fn load(&mut self, id: TileId, epoch: u64) {
        let Some(tile) = self.cache.tile_mut(id) else {
            return;
        };
        if !tile.begin_loading() {
            return;
        }

        let job = DecodeJob {
            id,
            epoch,
            rect: tile.rect(),
            corrector: self.corrector,
            format: self.pixel_format,
        };
        debug!(level = id.level, index = id.index, rect = %job.rect, "Dispatching decode");
        self.in_flight += 1;
        worker::dispatch(
            &self.runtime,
            Arc::clone(&self.shared),
            job,
            self.completions_tx.clone(),
        );
    }

    // =========================================================================
    // Completions
    // =========================================================================

    /// Apply every completion that has already arrived, without waiting.
    ///
    /// Returns the number of completions handled.
    ///
    /// # Errors
    ///
    /// Stops at the first [`TileError::DecodeFailure`]; completions after it
    /// stay queued for the next call.
    pub fn poll_completions(&mut self) -> Result<usize, TileError> {
        self.check_context()?;
        self.check_live()?;

        let mut handled = 0;
        loop {
            let received = match self.completions_rx.as_mut() {
                Some(rx) => rx.try_recv(),
                None => Err(TryRecvError::Disconnected),
            };
            match received {
                Ok(completion) => {
                    self.apply(completion)?;
                    handled += 1;
                }
                Err(_) => return Ok(handled),
            }
        }
    }

    /// Wait for the next completion and apply it.
    ///
    /// Returns `Ok(None)` immediately when no decode is in flight.
    pub async fn next_completion(&mut self) -> Result<Option<LoadEvent>, TileError> {
        self.check_context()?;
        self.check_live()?;
        if self.in_flight == 0 {
            return Ok(None);
        }

        let Some(rx) = self.completions_rx.as_mut() else {
            return Ok(None);
        };
        // The provider holds a sender, so the channel cannot close while live
        let Some(completion) = rx.recv().await else {
            return Ok(None);
        };
        self.apply(completion).map(Some)
    }

    /// Apply completions until no decode is in flight.
    pub async fn settle(&mut self) -> Result<(), TileError> {
        while self.next_completion().await?.is_some() {}
        Ok(())
    }

    /// Apply one worker result on the coordination thread.
    fn apply(&mut self, completion: Completion) -> Result<LoadEvent, TileError> {
        let Completion { job, outcome } = completion;
        let id = job.id;
        self.in_flight = self.in_flight.saturating_sub(1);

        let outcome = match outcome {
            Outcome::Failed { raw_rect, error } => {
                // Reported even if the grid went away while decoding
                if let Some(tile) = self.cache.tile_in_epoch_mut(id, job.epoch) {
                    tile.cancel_loading();
                }
                warn!(
                    level = id.level,
                    rect = %raw_rect,
                    "Region decode failed: {}",
                    error
                );
                return Err(TileError::DecodeFailure {
                    level: id.level,
                    rect: raw_rect,
                    message: error.message,
                });
            }
            outcome => outcome,
        };

        let still_needed = self.shared.still_needed(id.level, &job.rect);
        let Some(tile) = self
            .cache
            .tile_in_epoch_mut(id, job.epoch)
            .filter(|tile| tile.is_loading())
        else {
            // The grid was evicted or replaced while decoding
            debug!(level = id.level, index = id.index, "Dropped completion for evicted grid");
            return Ok(match outcome {
                Outcome::Decoded(_) => LoadEvent::Discarded(id),
                _ => LoadEvent::Skipped(id),
            });
        };

        match outcome {
            Outcome::Decoded(buffer) if still_needed => {
                tile.fill(buffer);
                self.hits.push(id);
                let visible = resolve(&self.cache, &self.hits);
                (self.on_tiles_changed)(&visible);
                Ok(LoadEvent::Published(id))
            }
            Outcome::Decoded(buffer) => {
                tile.cancel_loading();
                debug!(
                    level = id.level,
                    index = id.index,
                    bytes = buffer.byte_len(),
                    "Released stale decode"
                );
                drop(buffer);
                Ok(LoadEvent::Discarded(id))
            }
            Outcome::Skipped | Outcome::Failed { .. } => {
                tile.cancel_loading();
                Ok(LoadEvent::Skipped(id))
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release the decoder and every decoded tile.
    ///
    /// In-flight decodes finish on their workers but their results are
    /// dropped. Every method except the queries fails afterwards.
    pub fn dispose(&mut self) -> Result<(), TileError> {
        self.check_context()?;
        self.check_live()?;
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        self.shared.dispose();
        self.completions_rx = None;
        self.hits.clear();
        let freed = self.cache.clear();
        debug!(
            freed_bytes = freed,
            abandoned = self.in_flight,
            "Disposed tile provider"
        );
        self.in_flight = 0;
    }

    fn check_context(&self) -> Result<(), MisuseError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(MisuseError::WrongContext)
        }
    }

    fn check_live(&self) -> Result<(), MisuseError> {
        if self.is_disposed() {
            Err(MisuseError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for TileProvider {
    fn drop(&mut self) {
        if !self.is_disposed() {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for TileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileProvider")
            .field("orientation", &self.corrector.orientation())
            .field("size", &self.corrector.logical_size())
            .field("disposed", &self.is_disposed())
            .field("stats", &self.stats())
            .finish()
    }
}
