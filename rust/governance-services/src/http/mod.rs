//! `reqwest` clients for the remote governance services.
//!
//! Every endpoint lives under `{base_url}/api/v1/` and answers with the
//! envelope `{success, data, message, retryable?}`. [`HttpTransport`] decodes
//! that envelope into a [`ServiceResponse`] once, so the typed clients only
//! pick paths and payload types.

mod ai;
mod classification;
mod ml;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::response::ServiceResponse;

pub use ai::HttpAiService;
pub use classification::HttpClassificationService;
pub use ml::HttpMlService;

/// Connection settings for one remote service.
#[derive(Clone)]
pub struct HttpServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpServiceConfig {
    /// Settings with no API key and a 30 second timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for HttpServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServiceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Wire envelope returned by every service endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retryable: Option<bool>,
}

impl Envelope {
    fn into_response<T: DeserializeOwned>(self) -> ServiceResponse<T> {
        if !self.success {
            return ServiceResponse::failure(
                self.message
                    .unwrap_or_else(|| "service reported failure".to_string()),
                self.retryable.unwrap_or(false),
            );
        }
        match serde_json::from_value(self.data) {
            Ok(value) => ServiceResponse::success(value),
            Err(e) => ServiceError::from(e).into(),
        }
    }
}

/// Shared HTTP plumbing of the service clients.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpServiceConfig) -> Result<Self, ServiceError> {
        let base_url = reqwest::Url::parse(&config.base_url).map_err(|e| {
            ServiceError::Configuration(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Configuration(format!(
                "base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Build `{base_url}/api/v1/{segments...}` with each segment percent-encoded.
    pub fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ServiceResponse<T> {
        let request = self.client.get(self.url(segments));
        self.send(request).await
    }

    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ServiceResponse<T> {
        let request = self.client.post(self.url(segments)).json(body);
        self.send(request).await
    }

    /// Like [`Self::post`] with a per-call timeout overriding the client default.
    pub async fn post_with_timeout<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
        timeout: Duration,
    ) -> ServiceResponse<T> {
        let request = self
            .client
            .post(self.url(segments))
            .json(body)
            .timeout(timeout);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> ServiceResponse<T> {
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = match ServiceError::from(e) {
                    ServiceError::Timeout { .. } => ServiceError::Timeout {
                        seconds: self.timeout.as_secs(),
                    },
                    other => other,
                };
                tracing::warn!(error = %err, "Service request failed");
                return err.into();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope>(&body)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or(body);
            tracing::debug!(status = status.as_u16(), "Service returned error status");
            return ServiceError::Http {
                status: status.as_u16(),
                message,
            }
            .into();
        }

        match response.json::<Envelope>().await {
            Ok(envelope) => envelope.into_response(),
            Err(e) => ServiceError::Decode(e.to_string()).into(),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
