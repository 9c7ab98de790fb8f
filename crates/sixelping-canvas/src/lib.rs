//! Decaying shared canvas: pixel planes, overlay compositing, and delta ingest.

pub mod ingest;
pub mod overlay;
pub mod render;
pub mod store;

pub use ingest::{decode_delta, encoded_dimensions, DeltaIngest, IngestStats};
pub use overlay::load_overlay;
pub use render::{encode_jpeg, transcode_to_jpeg, RenderedFrame};
pub use store::CanvasStore;

use sixelping_types::SixelError;

/// Generate an error aligned with canvas semantics.
pub fn canvas_error(message: impl Into<String>) -> SixelError {
    SixelError::Canvas(message.into())
}
