//! HTTP transport for the renderer API, live viewer streams, and the pull client.

pub mod client;
pub mod server;
pub mod view;

use async_trait::async_trait;
use bytes::Bytes;
use sixelping_types::{
    metrics::MetricsDatapoint, params::CanvasParameters, Result, SixelError,
};

pub use client::HttpRendererClient;
pub use server::{bind, renderer_router, serve, viewer_router, RendererState, ViewerState};
pub use view::FrameView;

/// Request/response contract of the renderer as seen by remote consumers.
#[async_trait]
pub trait RendererClient: Send + Sync {
    async fn canvas_parameters(&self) -> Result<CanvasParameters>;
    /// PNG snapshot of the canvas at the moment of the call.
    async fn rendered_image(&self) -> Result<Bytes>;
    async fn send_delta(&self, payload: Bytes) -> Result<()>;
    async fn send_metrics(&self, datapoint: &MetricsDatapoint) -> Result<()>;
}

pub fn network_error(message: impl Into<String>) -> SixelError {
    SixelError::Network(message.into())
}
