use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use sixelping_canvas::{load_overlay, CanvasStore, DeltaIngest};
use sixelping_network::{
    bind, renderer_router, serve, viewer_router, FrameView, HttpRendererClient, RendererState,
    ViewerState,
};
use sixelping_ops::{init_tracing, GaugeRegistry};
use sixelping_pump::{pacer_from_handshake, CaptureBroadcast, FramePacer, FramePump, RemotePoll};
use sixelping_stream::BroadcastStreamer;
use sixelping_types::config::SixelConfig;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "sixelping", version, about = "Decaying shared canvas renderer and live viewer")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "SIXELPING_CONFIG",
        default_value = "configs/dev.toml"
    )]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Own the canvas: accept deltas and push live frames to viewers.
    Render {
        #[arg(long)]
        bind: Option<String>,
        /// Static RGBA image composited over every rendered frame.
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Poll a remote renderer and re-serve its frames locally.
    Relay {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        renderer_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    init_tracing(&config.ops)?;

    match cli.command {
        Command::Render { bind, overlay } => {
            if let Some(addr) = bind {
                config.renderer.bind_addr = addr;
            }
            if let Some(path) = overlay {
                config.canvas.overlay_path = Some(path.display().to_string());
            }
            run_renderer(config).await
        }
        Command::Relay { bind, renderer_url } => {
            if let Some(addr) = bind {
                config.relay.bind_addr = addr;
            }
            if let Some(url) = renderer_url {
                config.relay.renderer_url = url;
            }
            run_relay(config).await
        }
    }
}

async fn run_renderer(config: SixelConfig) -> Result<()> {
    let canvas = Arc::new(CanvasStore::with_timeout(
        config.canvas.width,
        config.canvas.height,
        config.canvas.pixel_timeout(),
    ));
    if let Some(path) = &config.canvas.overlay_path {
        let overlay = load_overlay(path).with_context(|| format!("loading overlay {path}"))?;
        canvas.set_overlay(overlay)?;
    }
    info!(
        overlay = canvas.has_overlay()?,
        bind = %config.renderer.bind_addr,
        "Starting renderer"
    );

    let parameters = config.canvas.parameters();
    let pacer = FramePacer::from_parameters(&parameters)?;
    let streamer = BroadcastStreamer::new();
    let ingest = Arc::new(DeltaIngest::new(Arc::clone(&canvas)));
    let metrics = Arc::new(GaugeRegistry::new());
    let state = RendererState {
        ingest: Arc::clone(&ingest),
        streamer: streamer.clone(),
        metrics: metrics.clone(),
        parameters,
    };
    let listener = bind(&config.renderer.bind_addr).await?;
    let (server, stop) = spawn_server(
        listener,
        renderer_router(state, config.stream.max_delta_bytes),
    );

    let mut pump = FramePump::new(
        CaptureBroadcast::new(canvas, streamer.clone(), config.stream.jpeg_quality),
        pacer,
    );
    pump.run_until(shutdown_signal()).await;

    let deltas = ingest.stats();
    info!(
        deltas_received = deltas.deltas_received,
        deltas_rejected = deltas.deltas_rejected,
        gauges = metrics.len(),
        capture_failures = pump.failures(),
        "Renderer totals"
    );
    finish(server, stop, streamer).await
}

async fn run_relay(config: SixelConfig) -> Result<()> {
    let client = HttpRendererClient::new(
        config.relay.renderer_url.clone(),
        config.relay.request_timeout(),
    )?;
    let (parameters, pacer) = pacer_from_handshake(&client)
        .await
        .with_context(|| format!("handshake with {}", config.relay.renderer_url))?;

    let view = FrameView::new();
    let streamer = BroadcastStreamer::new();
    let listener = bind(&config.relay.bind_addr).await?;
    let (server, stop) = spawn_server(
        listener,
        viewer_router(ViewerState {
            view: view.clone(),
            streamer: streamer.clone(),
        }),
    );

    let poll = RemotePoll::new(client, view, parameters)
        .with_streamer(streamer.clone(), config.stream.jpeg_quality);
    let mut pump = FramePump::new(poll, pacer);
    pump.run_until(shutdown_signal()).await;

    info!(poll_failures = pump.failures(), "Relay totals");
    finish(server, stop, streamer).await
}

type ServerTask = JoinHandle<sixelping_types::Result<()>>;

fn spawn_server(listener: TcpListener, router: Router) -> (ServerTask, oneshot::Sender<()>) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(serve(listener, router, async move {
        let _ = stop_rx.await;
    }));
    (task, stop_tx)
}

/// Close live streams first so graceful shutdown is not held open by them.
async fn finish(
    server: ServerTask,
    stop: oneshot::Sender<()>,
    streamer: BroadcastStreamer,
) -> Result<()> {
    let stats = streamer.stats();
    info!(
        frames_published = stats.frames_published,
        frames_delivered = stats.frames_delivered,
        frames_dropped = stats.frames_dropped,
        "Live stream totals"
    );
    streamer.close();
    let _ = stop.send(());
    server.await.context("server task panicked")??;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            warn!("Unable to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}

/// A missing file runs on built-in defaults. A file that exists but cannot be
/// read, parsed or validated is fatal.
fn load_config(path: &Path) -> Result<SixelConfig> {
    if !path.exists() {
        eprintln!(
            "Config file '{}' not found. Falling back to internal defaults.",
            path.display()
        );
        return Ok(default_config());
    }
    let config = SixelConfig::from_file(path)?;
    config
        .validate()
        .with_context(|| format!("invalid config in '{}'", path.display()))?;
    Ok(config)
}

fn default_config() -> SixelConfig {
    let config = SixelConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}
