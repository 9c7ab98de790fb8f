use std::{future::Future, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, FromRef, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sixelping_canvas::DeltaIngest;
use sixelping_ops::MetricsSink;
use sixelping_stream::{multipart_stream, BroadcastStreamer, MultipartFramer};
use sixelping_types::{
    clock::unix_nanos, metrics::MetricsDatapoint, params::CanvasParameters, Result, SixelError,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{network_error, view::FrameView};

const NO_STORE: &str = "no-cache, no-store, no-transform";

/// Shared state behind the renderer's HTTP API.
#[derive(Clone)]
pub struct RendererState {
    pub ingest: Arc<DeltaIngest>,
    pub streamer: BroadcastStreamer,
    pub metrics: Arc<dyn MetricsSink>,
    pub parameters: CanvasParameters,
}

impl FromRef<RendererState> for BroadcastStreamer {
    fn from_ref(state: &RendererState) -> Self {
        state.streamer.clone()
    }
}

/// Shared state behind a relay's viewer endpoints.
#[derive(Clone)]
pub struct ViewerState {
    pub view: FrameView,
    pub streamer: BroadcastStreamer,
}

impl FromRef<ViewerState> for BroadcastStreamer {
    fn from_ref(state: &ViewerState) -> Self {
        state.streamer.clone()
    }
}

/// Renderer API: delta ingest, handshake, snapshot fetch, metrics, live stream.
pub fn renderer_router(state: RendererState, max_delta_bytes: usize) -> Router {
    Router::new()
        .route("/api/delta", post(post_delta))
        .route("/api/parameters", get(get_parameters))
        .route("/api/image", get(get_image))
        .route("/api/metrics", post(post_metrics))
        .route("/stream.mjpeg", get(live_stream))
        .layer(DefaultBodyLimit::max(max_delta_bytes))
        .with_state(state)
}

/// Relay endpoints: live stream and the most recent polled image.
pub fn viewer_router(state: ViewerState) -> Router {
    Router::new()
        .route("/stream.mjpeg", get(live_stream))
        .route("/image.png", get(get_latest_image))
        .with_state(state)
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| network_error(format!("failed to bind {addr}: {err}")))
}

pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|err| network_error(format!("listener has no local address: {err}")))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| network_error(format!("http server error: {err}")))
}

/// Caller-visible error: client faults map to 400, everything else to 500.
struct ApiError(SixelError);

impl From<SixelError> for ApiError {
    fn from(err: SixelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.0.to_string()).into_response()
    }
}

async fn post_delta(
    State(state): State<RendererState>,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let ingest = Arc::clone(&state.ingest);
    tokio::task::spawn_blocking(move || ingest.ingest_encoded(&body))
        .await
        .map_err(|err| network_error(format!("delta task failed: {err}")))??;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_parameters(State(state): State<RendererState>) -> Json<CanvasParameters> {
    Json(state.parameters)
}

async fn get_image(State(state): State<RendererState>) -> std::result::Result<Response, ApiError> {
    let canvas = Arc::clone(state.ingest.canvas());
    let png = tokio::task::spawn_blocking(move || canvas.render(unix_nanos())?.encode_png())
        .await
        .map_err(|err| network_error(format!("render task failed: {err}")))??;
    Ok(png_response(Bytes::from(png)))
}

async fn post_metrics(
    State(state): State<RendererState>,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let datapoint: MetricsDatapoint = serde_json::from_slice(&body)
        .map_err(|err| SixelError::Decode(format!("invalid metrics datapoint: {err}")))?;
    if let Err(err) = state.metrics.record(&datapoint) {
        warn!("Metrics datapoint rejected: {err}");
        return Ok(StatusCode::BAD_REQUEST);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_latest_image(State(state): State<ViewerState>) -> Response {
    match state.view.latest() {
        Some(png) => png_response(png),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no frame polled yet").into_response(),
    }
}

async fn live_stream(State(streamer): State<BroadcastStreamer>) -> Response {
    let framer = MultipartFramer::new();
    let content_type = framer.content_type();
    let subscription = streamer.subscribe();
    info!(subscriber = subscription.id(), "Live stream opened");
    let body = Body::from_stream(multipart_stream(subscription, framer));
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONNECTION, "close".to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

fn png_response(png: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, NO_STORE),
        ],
        png,
    )
        .into_response()
}
