//! Test utilities for integration tests.
//!
//! This module provides mock image sources and decoders that count, record,
//! block or fail decode requests.

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use region_tiles::{
    DecodeError, ImageSource, Orientation, PixelBuffer, PixelFormat, Rect, RegionDecoder,
    TileError, TileProvider, TileRef,
};

// =============================================================================
// Gate
// =============================================================================

/// Blocks decoders until opened, so tests can act while decodes are in flight.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

// =============================================================================
// Mock Decoder with Request Tracking
// =============================================================================

/// Counters shared between a test and the decoder it hands to a provider.
#[derive(Default)]
pub struct DecoderProbe {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<(Rect, u32, Option<PixelFormat>)>>,
    pub dropped: AtomicBool,
}

impl DecoderProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Rect, u32, Option<PixelFormat>)> {
        self.requests.lock().clone()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Wait until the decoder has been dropped by every holder.
    pub async fn wait_dropped(&self) -> bool {
        for _ in 0..200 {
            if self.is_dropped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// How a [`MockDecoder`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Return an error for every region
    Fail,
    /// Panic inside `decode_region`
    Panic,
}

/// A decoder producing grey buffers of the right size for any region.
pub struct MockDecoder {
    width: u32,
    height: u32,
    probe: Arc<DecoderProbe>,
    gate: Option<Arc<Gate>>,
    fault: Fault,
    /// Restrict the gate and fault to one sample size
    only_level: Option<u32>,
}

impl MockDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            probe: Arc::new(DecoderProbe::default()),
            gate: None,
            fault: Fault::None,
            only_level: None,
        }
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fault = Fault::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.fault = Fault::Panic;
        self
    }

    /// Apply the gate and fault only to decodes at `level`.
    pub fn only_at_level(mut self, level: u32) -> Self {
        self.only_level = Some(level);
        self
    }

    pub fn probe(&self) -> Arc<DecoderProbe> {
        Arc::clone(&self.probe)
    }
}

impl RegionDecoder for MockDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn decode_region(
        &self,
        rect: Rect,
        sample_size: u32,
        format: Option<PixelFormat>,
    ) -> Result<PixelBuffer, DecodeError> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .requests
            .lock()
            .push((rect, sample_size, format));

        let affected = self.only_level.map_or(true, |level| level == sample_size);
        if affected {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            match self.fault {
                Fault::None => {}
                Fault::Fail => return Err(DecodeError::new("corrupt scan line")),
                Fault::Panic => panic!("scan line table out of range"),
            }
        }

        let format = format.unwrap_or(PixelFormat::Luma8);
        let width = (rect.width() as u32 / sample_size).max(1);
        let height = (rect.height() as u32 / sample_size).max(1);
        let len = width as usize * height as usize * format.bytes_per_pixel();
        PixelBuffer::new(width, height, format, vec![0x80u8; len])
            .ok_or_else(|| DecodeError::new("buffer size mismatch"))
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Mock Image Sources
// =============================================================================

/// An image source that hands out one prepared decoder.
pub struct MockSource {
    decoder: Mutex<Option<MockDecoder>>,
    orientation: Orientation,
}

impl MockSource {
    pub fn new(decoder: MockDecoder) -> Self {
        Self {
            decoder: Mutex::new(Some(decoder)),
            orientation: Orientation::Rotate0,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

#[async_trait]
impl ImageSource for MockSource {
    type Decoder = MockDecoder;

    async fn open_decoder(&self) -> Result<MockDecoder, TileError> {
        self.decoder.lock().take().ok_or_else(|| TileError::Construction {
            reason: "decoder already opened".to_string(),
        })
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }
}

/// An image source whose decoder can never be opened.
pub struct UnreadableSource;

#[async_trait]
impl ImageSource for UnreadableSource {
    type Decoder = MockDecoder;

    async fn open_decoder(&self) -> Result<MockDecoder, TileError> {
        Err(TileError::Construction {
            reason: "unsupported image format".to_string(),
        })
    }

    fn orientation(&self) -> Orientation {
        Orientation::Rotate0
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Every publish notification a provider has made.
#[derive(Default)]
pub struct PublishLog {
    /// Visible tile count passed to each notification
    pub sizes: Mutex<Vec<usize>>,
}

impl PublishLog {
    pub fn count(&self) -> usize {
        self.sizes.lock().len()
    }

    pub fn last(&self) -> Option<usize> {
        self.sizes.lock().last().copied()
    }
}

/// Open a provider over `source`, recording publish notifications.
pub async fn open_logged<S: ImageSource>(source: S) -> (TileProvider, Arc<PublishLog>) {
    let log = Arc::new(PublishLog::default());
    let sink = Arc::clone(&log);
    let provider = TileProvider::open(source, move |tiles: &[TileRef<'_>]| {
        sink.sizes.lock().push(tiles.len());
    })
    .await
    .unwrap();
    (provider, log)
}

/// Open a provider over a plain mock decoder of the given size.
pub async fn open_mock(width: u32, height: u32) -> (TileProvider, Arc<DecoderProbe>) {
    let decoder = MockDecoder::new(width, height);
    let probe = decoder.probe();
    let (provider, _) = open_logged(MockSource::new(decoder)).await;
    (provider, probe)
}
