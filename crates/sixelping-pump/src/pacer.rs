use std::time::Duration;

use sixelping_types::{
    params::{frame_period, CanvasParameters},
    Result,
};
use tokio::time::{sleep_until, Instant};

/// Drift-corrected tick schedule on the monotonic clock.
///
/// The deadline advances by exactly one period per tick, independent of how
/// long the tick's work took. Overruns leave the deadline in the past, so the
/// next waits return immediately until the schedule has caught up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    deadline: Instant,
}

impl FramePacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: Instant::now(),
        }
    }

    pub fn from_fps(fps: u32) -> Result<Self> {
        Ok(Self::new(frame_period(fps)?))
    }

    pub fn from_parameters(params: &CanvasParameters) -> Result<Self> {
        Ok(Self::new(params.frame_period()?))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Re-anchor the schedule at the current instant.
    pub fn reset(&mut self) {
        self.deadline = Instant::now();
    }

    pub async fn wait(&mut self) {
        self.deadline += self.period;
        sleep_until(self.deadline).await;
    }
}
