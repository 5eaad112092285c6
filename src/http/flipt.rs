use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::{fetch_fn, FetchFn};
use crate::error::{ErrorCode, FloptError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("flopt/", env!("CARGO_PKG_VERSION"));

/// Connection settings for a Flipt server.
#[derive(Debug, Clone)]
pub struct FliptConfig {
    pub base_url: String,
    pub namespace: String,
    pub timeout: Duration,
    /// Sent as a bearer token when set.
    pub client_token: Option<String>,
}

impl Default for FliptConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client_token: None,
        }
    }
}

impl FliptConfig {
    pub fn new(base_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            FloptError::with_source(
                ErrorCode::ConfigInvalidUrl,
                format!("invalid base url {:?}", self.base_url),
                e,
            )
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(FloptError::config_error(
                ErrorCode::ConfigInvalidUrl,
                format!("base url must be http(s), got {:?}", self.base_url),
            ));
        }

        if self.namespace.is_empty() {
            return Err(FloptError::config_error(
                ErrorCode::ConfigMissingRequired,
                "namespace is required",
            ));
        }

        if self.timeout.is_zero() {
            return Err(FloptError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "timeout must be positive",
            ));
        }

        Ok(())
    }
}

/// Flag as returned by `GET /api/v1/namespaces/{namespace}/flags/{key}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FliptFlag {
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub namespace_key: Option<String>,
}

/// Fetches flag values from a Flipt server.
///
/// When the flag is not found an error is returned, so a missing flag keeps
/// its cached value instead of being flipped off.
pub struct FliptFetcher {
    client: Client,
    base_url: Url,
    config: FliptConfig,
}

impl FliptFetcher {
    pub fn new(config: FliptConfig) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            FloptError::with_source(ErrorCode::ConfigInvalidUrl, "invalid base url", e)
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                FloptError::with_source(
                    ErrorCode::HttpNetworkError,
                    "Failed to create HTTP client",
                    e,
                )
            })?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Fetch the enabled state of `key`, giving up as soon as `cancel` fires.
    pub async fn fetch(&self, cancel: &CancellationToken, key: &str) -> Result<bool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FloptError::cancelled()),
            result = self.do_fetch(key) => result,
        }
    }

    /// Adapt this fetcher for [`RefresherOptions`](crate::RefresherOptions).
    pub fn into_fetch_fn(self) -> FetchFn {
        let fetcher = Arc::new(self);
        fetch_fn(move |cancel, key| {
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch(&cancel, &key).await }
        })
    }

    pub(crate) fn flag_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FloptError::config_error(ErrorCode::ConfigInvalidUrl, "base url cannot be a base")
            })?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", self.config.namespace.as_str(), "flags", key]);
        Ok(url)
    }

    async fn do_fetch(&self, key: &str) -> Result<bool> {
        let mut request = self
            .client
            .get(self.flag_url(key)?)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");
        if let Some(token) = &self.config.client_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(convert_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body));
        }

        let body = response.text().await.map_err(|e| {
            FloptError::with_source(ErrorCode::HttpInvalidResponse, "Failed to read response", e)
        })?;

        let flag: Option<FliptFlag> = serde_json::from_str(&body).map_err(|e| {
            FloptError::with_source(
                ErrorCode::HttpInvalidResponse,
                format!("Failed to parse response: {}", e),
                e,
            )
        })?;

        match flag {
            Some(flag) => Ok(flag.enabled),
            None => Err(FloptError::new(
                ErrorCode::FlagNotFound,
                format!("flag {} not found", key),
            )),
        }
    }
}

fn status_to_error(status: StatusCode, body: &str) -> FloptError {
    let (code, category) = match status {
        StatusCode::BAD_REQUEST => (ErrorCode::HttpBadRequest, "Client Error"),
        StatusCode::UNAUTHORIZED => (ErrorCode::HttpUnauthorized, "Authentication Error"),
        StatusCode::FORBIDDEN => (ErrorCode::HttpForbidden, "Authorization Error"),
        StatusCode::NOT_FOUND => (ErrorCode::FlagNotFound, "Not Found"),
        StatusCode::TOO_MANY_REQUESTS => (ErrorCode::HttpRateLimited, "Rate Limited"),
        s if s.is_server_error() => (ErrorCode::HttpServerError, "Server Error"),
        s if s.is_client_error() => (ErrorCode::HttpBadRequest, "Client Error"),
        _ => (ErrorCode::HttpInvalidResponse, "Unexpected Status"),
    };

    FloptError::network_error(code, format!("{}: {} - {}", category, status.as_u16(), body))
}

fn convert_error(error: reqwest::Error) -> FloptError {
    if error.is_timeout() {
        FloptError::with_source(ErrorCode::HttpTimeout, "Request timed out", error)
    } else if error.is_connect() {
        FloptError::with_source(ErrorCode::HttpNetworkError, "Connection failed", error)
    } else {
        FloptError::with_source(ErrorCode::FetchFailed, error.to_string(), error)
    }
}
