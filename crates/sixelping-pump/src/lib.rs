//! Periodic frame pumps: server-side capture+broadcast and viewer-side remote polling.

pub mod capture;
pub mod pacer;
pub mod poll;

use std::future::Future;

use async_trait::async_trait;
use sixelping_network::RendererClient;
use sixelping_types::{Result, SixelError};
use tracing::{info, warn};

pub use capture::CaptureBroadcast;
pub use pacer::FramePacer;
pub use poll::RemotePoll;

/// One unit of periodic work driven by a [`FramePump`].
#[async_trait]
pub trait FrameSource: Send {
    async fn tick(&mut self) -> Result<()>;
}

/// Runs a [`FrameSource`] on a drift-corrected schedule.
pub struct FramePump<S: FrameSource> {
    source: S,
    pacer: FramePacer,
    ticks: u64,
    failures: u64,
}

impl<S: FrameSource> FramePump<S> {
    pub fn new(source: S, pacer: FramePacer) -> Self {
        Self {
            source,
            pacer,
            ticks: 0,
            failures: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Tick until `shutdown` resolves. Returns the number of completed ticks.
    pub async fn run_until<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        info!(
            period_ms = self.pacer.period().as_millis() as u64,
            "Frame pump started"
        );
        self.pacer.reset();
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }
        info!(
            ticks = self.ticks,
            failures = self.failures,
            "Frame pump stopped"
        );
        self.ticks
    }

    async fn step(&mut self) {
        if let Err(err) = self.source.tick().await {
            self.failures += 1;
            warn!("Frame tick failed: {err}");
        }
        self.ticks += 1;
        self.pacer.wait().await;
    }
}

/// Fetch canvas parameters once and derive the pull-side pacing from them.
pub async fn pacer_from_handshake<C: RendererClient + ?Sized>(
    client: &C,
) -> Result<(sixelping_types::params::CanvasParameters, FramePacer)> {
    let params = client.canvas_parameters().await?;
    let pacer = FramePacer::from_parameters(&params).map_err(|err| match err {
        SixelError::Configuration(msg) => {
            SixelError::Configuration(format!("renderer handshake unusable: {msg}"))
        }
        other => other,
    })?;
    info!(
        width = params.width,
        height = params.height,
        fps = params.fps,
        "Renderer handshake complete"
    );
    Ok((params, pacer))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRenderer;
    use std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    };
    use tokio::time::{sleep, Instant};

    struct Recorder {
        starts: Arc<std::sync::Mutex<Vec<Duration>>>,
        origin: Instant,
        fail_every: u64,
        count: Arc<AtomicU64>,
    }

    #[async_trait]
    impl FrameSource for Recorder {
        async fn tick(&mut self) -> Result<()> {
            self.starts.lock().unwrap().push(self.origin.elapsed());
            let n = self.count.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(20 + (n % 3) * 25)).await;
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(SixelError::Network("flaky".into()));
            }
            Ok(())
        }
    }

    fn recorder(fail_every: u64) -> (Recorder, Arc<std::sync::Mutex<Vec<Duration>>>) {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Recorder {
                starts: starts.clone(),
                origin: Instant::now(),
                fail_every,
                count: Arc::new(AtomicU64::new(0)),
            },
            starts,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pump_ticks_on_schedule_until_shutdown() {
        let (source, starts) = recorder(0);
        let mut pump = FramePump::new(source, FramePacer::from_fps(10).unwrap());
        let ticks = pump.run_until(sleep(Duration::from_millis(1_050))).await;

        assert_eq!(ticks, 11);
        let starts = starts.lock().unwrap().clone();
        let expected: Vec<Duration> = (0..11).map(|n| Duration::from_millis(n * 100)).collect();
        assert_eq!(starts, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_keep_the_schedule() {
        let (source, starts) = recorder(2);
        let mut pump = FramePump::new(source, FramePacer::from_fps(5).unwrap());
        pump.run_until(sleep(Duration::from_millis(1_100))).await;

        assert_eq!(pump.ticks(), 6);
        assert_eq!(pump.failures(), 3);
        assert_eq!(starts.lock().unwrap().last(), Some(&Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn handshake_derives_pacer() {
        let renderer = MockRenderer::new(4, 4, 25);
        let (params, pacer) = pacer_from_handshake(&renderer).await.expect("handshake");
        assert_eq!((params.width, params.height), (4, 4));
        assert_eq!(pacer.period(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn handshake_with_zero_fps_is_fatal() {
        let renderer = MockRenderer::new(4, 4, 0);
        let err = pacer_from_handshake(&renderer).await.unwrap_err();
        assert!(matches!(err, SixelError::Configuration(ref msg) if msg.contains("handshake")));
    }
}
