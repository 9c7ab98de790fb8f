use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{params::CanvasParameters, Result, SixelError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Time for a pixel to fade from its written color to black.
    pub pixel_timeout_ms: u64,
    #[serde(default)]
    pub overlay_path: Option<String>,
}

impl CanvasConfig {
    pub fn pixel_timeout(&self) -> Duration {
        Duration::from_millis(self.pixel_timeout_ms)
    }

    pub fn parameters(&self) -> CanvasParameters {
        CanvasParameters::new(self.width, self.height, self.fps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub jpeg_quality: u8,
    /// Upper bound for an encoded delta upload.
    pub max_delta_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub renderer_url: String,
    pub request_timeout_ms: u64,
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SixelConfig {
    pub canvas: CanvasConfig,
    pub stream: StreamConfig,
    pub renderer: RendererConfig,
    pub relay: RelayConfig,
    pub ops: OpsConfig,
}

impl Default for SixelConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig {
                width: 1920,
                height: 1080,
                fps: 1,
                pixel_timeout_ms: 10_000,
                overlay_path: None,
            },
            stream: StreamConfig {
                jpeg_quality: 75,
                max_delta_bytes: 32 * 1024 * 1024,
            },
            renderer: RendererConfig {
                bind_addr: "0.0.0.0:50051".into(),
            },
            relay: RelayConfig {
                bind_addr: "0.0.0.0:8081".into(),
                renderer_url: "http://localhost:50051".into(),
                request_timeout_ms: 1_000,
            },
            ops: OpsConfig {
                log_level: "info".into(),
            },
        }
    }
}

impl SixelConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            SixelError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            SixelError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(SixelError::Configuration(
                "canvas.width and canvas.height must be greater than zero".into(),
            ));
        }
        if self.canvas.fps == 0 {
            return Err(SixelError::Configuration(
                "canvas.fps must be greater than zero".into(),
            ));
        }
        if self.canvas.pixel_timeout_ms == 0 {
            return Err(SixelError::Configuration(
                "canvas.pixel_timeout_ms must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(SixelError::Configuration(
                "stream.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.stream.max_delta_bytes == 0 {
            return Err(SixelError::Configuration(
                "stream.max_delta_bytes must be greater than zero".into(),
            ));
        }
        if self.relay.request_timeout_ms == 0 {
            return Err(SixelError::Configuration(
                "relay.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.relay.renderer_url.is_empty() {
            return Err(SixelError::Configuration(
                "relay.renderer_url must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_sixel_config_from_file() {
        let temp_path = std::env::temp_dir().join("sixelping-config-test.toml");
        let mut config = SixelConfig::default();
        config.canvas.width = 640;
        config.canvas.height = 480;
        config.canvas.overlay_path = Some("logo.png".into());
        config.relay.renderer_url = "http://renderer:50051".into();

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = SixelConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.canvas.width, 640);
        assert_eq!(loaded.canvas.height, 480);
        assert_eq!(loaded.canvas.overlay_path.as_deref(), Some("logo.png"));
        assert_eq!(loaded.relay.renderer_url, "http://renderer:50051");
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = SixelConfig::from_file("/nonexistent/sixelping.toml").unwrap_err();
        assert!(matches!(err, SixelError::Configuration(_)));
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = SixelConfig::default();
        assert!(config.validate().is_ok());

        config.canvas.width = 0;
        assert!(config.validate().is_err());
        config.canvas.width = 16;
        config.canvas.fps = 0;
        assert!(config.validate().is_err());
        config.canvas.fps = 10;
        config.canvas.pixel_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.canvas.pixel_timeout_ms = 1_000;
        config.stream.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.stream.jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.stream.jpeg_quality = 90;
        config.relay.request_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.relay.request_timeout_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn canvas_parameters_follow_config() {
        let config = SixelConfig::default();
        let params = config.canvas.parameters();
        assert_eq!(params.width, 1920);
        assert_eq!(params.height, 1080);
        assert_eq!(params.fps, 1);
        assert_eq!(config.canvas.pixel_timeout(), Duration::from_secs(10));
    }
}
