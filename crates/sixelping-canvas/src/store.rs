use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use image::RgbaImage;
use sixelping_types::{Result, SixelError};
use tracing::{debug, info};

use crate::{canvas_error, overlay::composite_over, render::RenderedFrame};

/// Bytes per pixel in delta buffers (straight RGBA, alpha last).
pub const DELTA_CHANNELS: usize = 4;

/// Shared canvas whose pixels fade to black unless refreshed.
///
/// Every operation takes the same exclusive lock, so a render never observes a
/// partially applied delta and deltas never interleave.
pub struct CanvasStore {
    width: u32,
    height: u32,
    pixel_timeout_nanos: u64,
    state: Mutex<CanvasState>,
}

struct CanvasState {
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
    last_updated: Vec<u64>,
    overlay: Option<Arc<RgbaImage>>,
}

impl CanvasStore {
    pub fn new(width: u32, height: u32, pixel_timeout_nanos: u64) -> Self {
        let pixels = width as usize * height as usize;
        info!(
            width,
            height,
            pixel_timeout_ms = pixel_timeout_nanos / 1_000_000,
            "Canvas created"
        );
        Self {
            width,
            height,
            pixel_timeout_nanos,
            state: Mutex::new(CanvasState {
                red: vec![0; pixels],
                green: vec![0; pixels],
                blue: vec![0; pixels],
                last_updated: vec![0; pixels],
                overlay: None,
            }),
        }
    }

    pub fn with_timeout(width: u32, height: u32, pixel_timeout: Duration) -> Self {
        let nanos = u64::try_from(pixel_timeout.as_nanos()).unwrap_or(u64::MAX);
        Self::new(width, height, nanos)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Overwrite every pixel whose alpha byte is non-zero and stamp it with `now`.
    ///
    /// Returns the number of pixels written. A buffer of the wrong length is
    /// rejected before the canvas is touched.
    pub fn apply_delta(&self, buffer: &[u8], now: u64) -> Result<usize> {
        let expected = self.pixel_count() * DELTA_CHANNELS;
        if buffer.len() != expected {
            return Err(SixelError::InvalidBufferLength {
                expected,
                actual: buffer.len(),
            });
        }

        let mut state = self.lock()?;
        let state = &mut *state;
        let mut written = 0;
        for (idx, px) in buffer.chunks_exact(DELTA_CHANNELS).enumerate() {
            if px[3] == 0 {
                continue;
            }
            state.red[idx] = px[0];
            state.green[idx] = px[1];
            state.blue[idx] = px[2];
            state.last_updated[idx] = now;
            written += 1;
        }
        debug!(written, now, "Delta applied");
        Ok(written)
    }

    pub fn set_overlay(&self, overlay: RgbaImage) -> Result<()> {
        let (actual_width, actual_height) = overlay.dimensions();
        if actual_width != self.width || actual_height != self.height {
            return Err(SixelError::InvalidDimensions {
                expected_width: self.width,
                expected_height: self.height,
                actual_width,
                actual_height,
            });
        }
        let overlay = Arc::new(overlay);
        self.lock()?.overlay = Some(overlay);
        info!("Canvas overlay replaced");
        Ok(())
    }

    pub fn has_overlay(&self) -> Result<bool> {
        Ok(self.lock()?.overlay.is_some())
    }

    /// Produce an opaque snapshot of the canvas as seen at `now`.
    pub fn render(&self, now: u64) -> Result<RenderedFrame> {
        let mut out = vec![0u8; self.pixel_count() * DELTA_CHANNELS];
        let overlay = {
            let state = self.lock()?;
            for (idx, px) in out.chunks_exact_mut(DELTA_CHANNELS).enumerate() {
                let last = state.last_updated[idx];
                let timeout = self.pixel_timeout_nanos;
                px[0] = decay_channel(state.red[idx], last, now, timeout);
                px[1] = decay_channel(state.green[idx], last, now, timeout);
                px[2] = decay_channel(state.blue[idx], last, now, timeout);
                px[3] = u8::MAX;
            }
            state.overlay.clone()
        };

        // The overlay is immutable once stored, so blending can happen unlocked.
        if let Some(overlay) = overlay {
            composite_over(&mut out, overlay.as_raw());
        }

        let image = RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| canvas_error("rendered buffer does not match canvas size"))?;
        Ok(RenderedFrame::new(image))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CanvasState>> {
        self.state
            .lock()
            .map_err(|_| canvas_error("canvas lock poisoned"))
    }
}

/// `floor(value * remaining / timeout)` in exact integer arithmetic.
///
/// Pixels stamped after `now` are fully lit whatever the timeout, so the
/// elapsed time never underflows.
fn decay_channel(value: u8, last_updated: u64, now: u64, timeout: u64) -> u8 {
    if last_updated > now {
        return value;
    }
    let remaining = timeout.saturating_sub(now - last_updated);
    if remaining == 0 {
        return 0;
    }
    if remaining >= timeout {
        return value;
    }
    ((value as u128 * remaining as u128) / timeout as u128) as u8
}
