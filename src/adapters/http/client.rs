//! Authenticated JSON client for the operational API

use super::channel::RateLimitedChannel;
use crate::config::{ApiConfig, SecretString};
use crate::domain::{ApiError, Result, TallyError};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// JSON-over-HTTP client whose every call goes through the shared channel
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: SecretString,
    channel: Arc<RateLimitedChannel>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Builds the client
    ///
    /// # Errors
    ///
    /// Returns `TallyError::Configuration` if the base URL is malformed or the
    /// TLS backend cannot be initialised.
    pub fn new(config: &ApiConfig, channel: Arc<RateLimitedChannel>) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            tracing::warn!("TLS certificate verification disabled for API client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| TallyError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        // A trailing slash keeps Url::join from dropping the last path segment
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| TallyError::Configuration(format!("Invalid api.base_url: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
            channel,
        })
    }

    pub fn channel(&self) -> &Arc<RateLimitedChannel> {
        &self.channel
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid endpoint '{path}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.expose_secret().as_ref())
    }

    /// GET `path` with query parameters and decode the body as JSON
    pub async fn get_json(
        &self,
        label: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        self.channel
            .execute(label, || async {
                let request = self.authorize(self.http.get(url.clone()).query(query));
                send(request).await
            })
            .await
    }

    /// POST a JSON body to `path` and decode the response as JSON
    pub async fn post_json(
        &self,
        label: &str,
        path: &str,
        body: &Value,
    ) -> std::result::Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        self.channel
            .execute(label, || async {
                let request = self.authorize(self.http.post(url.clone()).json(body));
                send(request).await
            })
            .await
    }
}

async fn send(request: RequestBuilder) -> std::result::Result<Value, ApiError> {
    let response = request.send().await.map_err(classify_transport_error)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status.as_u16(), &body));
    }

    let text = response.text().await.map_err(classify_transport_error)?;
    serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

fn classify_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else {
        ApiError::ConnectionFailed(e.to_string())
    }
}
