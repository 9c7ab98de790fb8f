use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SixelError};

/// Canvas geometry and frame rate handed to every pull consumer at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CanvasParameters {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Length of one frame period. A zero frame rate has no valid period.
    pub fn frame_period(&self) -> Result<Duration> {
        frame_period(self.fps)
    }
}

pub fn frame_period(fps: u32) -> Result<Duration> {
    if fps == 0 {
        return Err(SixelError::Configuration(
            "fps must be greater than zero to derive a frame period".into(),
        ));
    }
    let period = Duration::from_secs(1) / fps;
    if period.is_zero() {
        return Err(SixelError::Configuration(format!(
            "fps {fps} is too high to derive a frame period"
        )));
    }
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_fps() {
        let params = CanvasParameters::new(4, 4, 10);
        assert_eq!(params.frame_period().unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn zero_fps_is_configuration_error() {
        let params = CanvasParameters::new(4, 4, 0);
        assert!(matches!(
            params.frame_period(),
            Err(SixelError::Configuration(_))
        ));
    }

    #[test]
    fn absurd_fps_is_configuration_error() {
        assert!(frame_period(u32::MAX).is_err());
        assert_eq!(frame_period(1).unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn parameters_json_shape() {
        let params = CanvasParameters::new(1920, 1080, 2);
        let json = serde_json::to_value(params).expect("serialize params");
        assert_eq!(json["width"], 1920);
        assert_eq!(json["height"], 1080);
        assert_eq!(json["fps"], 2);
    }
}
