use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sixelping_canvas::CanvasStore;
use sixelping_stream::BroadcastStreamer;
use sixelping_types::{clock::unix_nanos, Result, SixelError};
use tracing::{debug, trace};

use crate::FrameSource;

/// Push side: render the canvas, JPEG-encode it, and publish to live viewers.
pub struct CaptureBroadcast {
    canvas: Arc<CanvasStore>,
    streamer: BroadcastStreamer,
    jpeg_quality: u8,
}

impl CaptureBroadcast {
    pub fn new(canvas: Arc<CanvasStore>, streamer: BroadcastStreamer, jpeg_quality: u8) -> Self {
        Self {
            canvas,
            streamer,
            jpeg_quality,
        }
    }
}

#[async_trait]
impl FrameSource for CaptureBroadcast {
    async fn tick(&mut self) -> Result<()> {
        if self.streamer.subscriber_count() == 0 {
            trace!("No live viewers, skipping capture");
            return Ok(());
        }

        let canvas = Arc::clone(&self.canvas);
        let quality = self.jpeg_quality;
        let jpeg =
            tokio::task::spawn_blocking(move || canvas.render(unix_nanos())?.encode_jpeg(quality))
                .await
                .map_err(|err| SixelError::Canvas(format!("capture task failed: {err}")))??;

        let report = self.streamer.publish(Bytes::from(jpeg));
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Frame captured"
        );
        Ok(())
    }
}
