use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};
use crate::types::{
    ConnectionReply, HealthReply, ResultsReply, StartScanReply, StartScanRequest, StatusReply,
    StopReply, TaskId,
};

/// The remote scan service, as seen by the session manager.
#[async_trait]
pub trait ScanApi: Send + Sync {
    async fn start_scan(&self, request: &StartScanRequest) -> Result<StartScanReply, ApiError>;
    async fn get_status(&self, task_id: &TaskId) -> Result<StatusReply, ApiError>;
    async fn get_results(&self, task_id: &TaskId) -> Result<ResultsReply, ApiError>;
    async fn stop_scan(&self, task_id: &TaskId) -> Result<StopReply, ApiError>;
    async fn test_connection(&self) -> Result<ConnectionReply, ApiError>;
    async fn health(&self) -> Result<HealthReply, ApiError>;
}

/// `ScanApi` over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpScanApi {
    client: Client,
    base: Url,
}

impl HttpScanApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base = config.parsed_base_url()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client, base })
    }

    /// Build from an existing client, e.g. one shared with other callers.
    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        if segments.is_empty() {
            return Ok(url);
        }
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&StartScanRequest>,
        require_success: bool,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();
        debug!(%method, %url, "scan api request");

        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        debug!(%status, bytes = text.len(), "scan api response");

        if require_success && !status.is_success() {
            return Err(ApiError::HttpStatus {
                endpoint,
                status: status.as_u16(),
                body: text,
            });
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            // Error payloads on non-2xx still decode above; anything else is reported by status.
            Err(_) if !status.is_success() => Err(ApiError::HttpStatus {
                endpoint,
                status: status.as_u16(),
                body: text,
            }),
            Err(source) => Err(ApiError::Decode { endpoint, source }),
        }
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn start_scan(&self, request: &StartScanRequest) -> Result<StartScanReply, ApiError> {
        self.call(Method::POST, &["scan"], Some(request), true).await
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<StatusReply, ApiError> {
        self.call(Method::GET, &["scan-status", task_id.as_str()], None, false)
            .await
    }

    async fn get_results(&self, task_id: &TaskId) -> Result<ResultsReply, ApiError> {
        self.call(Method::GET, &["scan-results", task_id.as_str()], None, false)
            .await
    }

    // Stop and health carry no in-band error envelope, so any non-2xx is a failure.
    async fn stop_scan(&self, task_id: &TaskId) -> Result<StopReply, ApiError> {
        self.call(Method::POST, &["stop-scan", task_id.as_str()], None, true)
            .await
    }

    async fn test_connection(&self) -> Result<ConnectionReply, ApiError> {
        self.call(Method::GET, &["test-connection"], None, false).await
    }

    async fn health(&self) -> Result<HealthReply, ApiError> {
        self.call(Method::GET, &[], None, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpScanApi {
        let cfg = ClientConfig {
            base_url: base.into(),
            ..ClientConfig::default()
        };
        HttpScanApi::new(&cfg).unwrap()
    }

    #[test]
    fn endpoints_keep_base_path_and_escape_ids() {
        let a = api("http://localhost:8000/api/");
        let url = a.endpoint(&["scan-status", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/scan-status/a%20b%2Fc");

        let b = api("http://localhost:8000");
        assert_eq!(b.endpoint(&["scan"]).unwrap().as_str(), "http://localhost:8000/scan");
        assert_eq!(b.endpoint(&[]).unwrap().as_str(), "http://localhost:8000/");
        assert_eq!(a.endpoint(&[]).unwrap().as_str(), "http://localhost:8000/api/");
    }
}
