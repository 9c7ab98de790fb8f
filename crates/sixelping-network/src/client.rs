use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Response};
use sixelping_types::{metrics::MetricsDatapoint, params::CanvasParameters, Result};
use tracing::debug;

use crate::{network_error, RendererClient};

/// `RendererClient` over the renderer's HTTP API.
#[derive(Clone)]
pub struct HttpRendererClient {
    base_url: String,
    http: Client,
}

impl HttpRendererClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| network_error(format!("failed to build http client: {err}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|err| network_error(format!("GET {path} failed: {err}")))?;
        let response = ensure_success(path, response).await?;
        response
            .bytes()
            .await
            .map_err(|err| network_error(format!("GET {path} body failed: {err}")))
    }

    async fn post(&self, path: &str, content_type: &str, body: Bytes) -> Result<()> {
        let response = self
            .http
            .post(self.url(path))
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| network_error(format!("POST {path} failed: {err}")))?;
        ensure_success(path, response).await?;
        Ok(())
    }
}

async fn ensure_success(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(network_error(format!("{path} returned {status}: {detail}")))
}

#[async_trait]
impl RendererClient for HttpRendererClient {
    async fn canvas_parameters(&self) -> Result<CanvasParameters> {
        let body = self.get_bytes("/api/parameters").await?;
        let params: CanvasParameters = serde_json::from_slice(&body)
            .map_err(|err| network_error(format!("invalid canvas parameters: {err}")))?;
        debug!(
            width = params.width,
            height = params.height,
            fps = params.fps,
            "Canvas parameters fetched"
        );
        Ok(params)
    }

    async fn rendered_image(&self) -> Result<Bytes> {
        self.get_bytes("/api/image").await
    }

    async fn send_delta(&self, payload: Bytes) -> Result<()> {
        self.post("/api/delta", "application/octet-stream", payload)
            .await
    }

    async fn send_metrics(&self, datapoint: &MetricsDatapoint) -> Result<()> {
        let body = serde_json::to_vec(datapoint)
            .map_err(|err| network_error(format!("failed to encode metrics: {err}")))?;
        self.post("/api/metrics", "application/json", Bytes::from(body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            HttpRendererClient::new("http://renderer:50051/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://renderer:50051");
        assert_eq!(
            client.url("/api/image"),
            "http://renderer:50051/api/image"
        );
    }

    #[tokio::test]
    async fn unreachable_renderer_is_network_error() {
        let client =
            HttpRendererClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = client.canvas_parameters().await.unwrap_err();
        assert!(matches!(err, sixelping_types::SixelError::Network(_)));
    }
}
