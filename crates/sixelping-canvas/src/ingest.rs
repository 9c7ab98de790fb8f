use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use image::{
    io::{Limits, Reader},
    RgbaImage,
};
use sixelping_types::{clock::unix_nanos, Result, SixelError};
use tracing::{debug, warn};

use crate::store::CanvasStore;

/// Counters for accepted and rejected delta uploads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub deltas_received: u64,
    pub deltas_rejected: u64,
}

/// Validates inbound delta payloads and forwards them to the canvas.
pub struct DeltaIngest {
    canvas: Arc<CanvasStore>,
    received: AtomicU64,
    rejected: AtomicU64,
}

impl DeltaIngest {
    pub fn new(canvas: Arc<CanvasStore>) -> Self {
        Self {
            canvas,
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn canvas(&self) -> &Arc<CanvasStore> {
        &self.canvas
    }

    /// Decode a PNG/JPEG delta and apply it at the current wall-clock time.
    pub fn ingest_encoded(&self, payload: &[u8]) -> Result<usize> {
        match decode_delta(payload, self.canvas.width(), self.canvas.height()) {
            Ok(image) => self.ingest_raw(image.as_raw()),
            Err(err) => self.record(Err(err)),
        }
    }

    /// Apply an already decoded straight-RGBA buffer at the current time.
    pub fn ingest_raw(&self, buffer: &[u8]) -> Result<usize> {
        let result = self.canvas.apply_delta(buffer, unix_nanos());
        self.record(result)
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            deltas_received: self.received.load(Ordering::Relaxed),
            deltas_rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: Result<usize>) -> Result<usize> {
        match &result {
            Ok(written) => {
                let total = self.received.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(written, total, "Delta accepted");
            }
            Err(err) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Delta rejected: {err}");
            }
        }
        result
    }
}

/// Width and height announced by an encoded image's header, without decoding
/// any pixel data.
pub fn encoded_dimensions(payload: &[u8]) -> Result<(u32, u32)> {
    image_reader(payload)?
        .into_dimensions()
        .map_err(|err| SixelError::Decode(format!("image header unreadable: {err}")))
}

/// Decode an encoded delta into straight RGBA and check it matches the canvas.
///
/// The size is checked from the header first, so an oversized upload is
/// rejected before any pixel buffer is allocated.
pub fn decode_delta(payload: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
    let (actual_width, actual_height) = encoded_dimensions(payload)?;
    if actual_width != width || actual_height != height {
        return Err(SixelError::InvalidDimensions {
            expected_width: width,
            expected_height: height,
            actual_width,
            actual_height,
        });
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(width);
    limits.max_image_height = Some(height);
    let mut reader = image_reader(payload)?;
    reader.limits(limits);
    let image = reader
        .decode()
        .map_err(|err| SixelError::Decode(format!("delta image decoding failed: {err}")))?
        .to_rgba8();
    Ok(image)
}

fn image_reader(payload: &[u8]) -> Result<Reader<Cursor<&[u8]>>> {
    Reader::new(Cursor::new(payload))
        .with_guessed_format()
        .map_err(|err| SixelError::Decode(format!("image format detection failed: {err}")))
}
