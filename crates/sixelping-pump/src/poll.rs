use async_trait::async_trait;
use bytes::Bytes;
use sixelping_canvas::{encoded_dimensions, transcode_to_jpeg};
use sixelping_network::{FrameView, RendererClient};
use sixelping_stream::BroadcastStreamer;
use sixelping_types::{params::CanvasParameters, Result, SixelError};
use tracing::debug;

use crate::FrameSource;

/// Pull side: fetch the renderer's snapshot and refresh the local view.
///
/// Snapshots whose size differs from the handshake are rejected and the view
/// keeps its previous frame. With a streamer attached the snapshot is also
/// re-encoded as JPEG and published to live viewers.
pub struct RemotePoll<C: RendererClient> {
    client: C,
    view: FrameView,
    parameters: CanvasParameters,
    streamer: Option<BroadcastStreamer>,
    jpeg_quality: u8,
}

impl<C: RendererClient> RemotePoll<C> {
    pub fn new(client: C, view: FrameView, parameters: CanvasParameters) -> Self {
        Self {
            client,
            view,
            parameters,
            streamer: None,
            jpeg_quality: 75,
        }
    }

    pub fn with_streamer(mut self, streamer: BroadcastStreamer, jpeg_quality: u8) -> Self {
        self.streamer = Some(streamer);
        self.jpeg_quality = jpeg_quality;
        self
    }
}

#[async_trait]
impl<C: RendererClient> FrameSource for RemotePoll<C> {
    async fn tick(&mut self) -> Result<()> {
        let png = self.client.rendered_image().await?;
        let (actual_width, actual_height) = encoded_dimensions(&png)?;
        let (width, height) = (self.parameters.width, self.parameters.height);
        if (actual_width, actual_height) != (width, height) {
            return Err(SixelError::InvalidDimensions {
                expected_width: width,
                expected_height: height,
                actual_width,
                actual_height,
            });
        }
        self.view.update(png.clone());

        let Some(streamer) = &self.streamer else {
            return Ok(());
        };
        if streamer.subscriber_count() == 0 {
            return Ok(());
        }

        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || transcode_to_jpeg(&png, quality))
            .await
            .map_err(|err| SixelError::Decode(format!("transcode task failed: {err}")))??;
        let report = streamer.publish(Bytes::from(jpeg));
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Polled frame relayed"
        );
        Ok(())
    }
}
