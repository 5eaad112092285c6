use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration errors
    ConfigMissingRequired,
    ConfigInvalidBootstrap,
    ConfigInvalidInterval,
    ConfigInvalidUrl,
    ConfigDuplicateMetric,
    ConfigMetricsError,

    // Fetch errors
    FetchFailed,
    FetchCancelled,
    FetchPanicked,
    FlagNotFound,

    // HTTP errors
    HttpBadRequest,
    HttpUnauthorized,
    HttpForbidden,
    HttpRateLimited,
    HttpServerError,
    HttpTimeout,
    HttpNetworkError,
    HttpInvalidResponse,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingRequired => "CONFIG_MISSING_REQUIRED",
            ErrorCode::ConfigInvalidBootstrap => "CONFIG_INVALID_BOOTSTRAP",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigDuplicateMetric => "CONFIG_DUPLICATE_METRIC",
            ErrorCode::ConfigMetricsError => "CONFIG_METRICS_ERROR",
            ErrorCode::FetchFailed => "FETCH_FAILED",
            ErrorCode::FetchCancelled => "FETCH_CANCELLED",
            ErrorCode::FetchPanicked => "FETCH_PANICKED",
            ErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
            ErrorCode::HttpBadRequest => "HTTP_BAD_REQUEST",
            ErrorCode::HttpUnauthorized => "HTTP_UNAUTHORIZED",
            ErrorCode::HttpForbidden => "HTTP_FORBIDDEN",
            ErrorCode::HttpRateLimited => "HTTP_RATE_LIMITED",
            ErrorCode::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ErrorCode::HttpNetworkError => "HTTP_NETWORK_ERROR",
            ErrorCode::HttpInvalidResponse => "HTTP_INVALID_RESPONSE",
        }
    }

    /// Whether a later refresh cycle may succeed where this one failed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::FetchFailed
                | ErrorCode::FetchCancelled
                | ErrorCode::FetchPanicked
                | ErrorCode::FlagNotFound
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpServerError
                | ErrorCode::HttpTimeout
                | ErrorCode::HttpNetworkError
                | ErrorCode::HttpInvalidResponse
        )
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct FloptError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FloptError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn network_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// Generic failure for fetch functions that have no better code.
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchFailed, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::FetchCancelled, "fetch cancelled")
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigMissingRequired
                | ErrorCode::ConfigInvalidBootstrap
                | ErrorCode::ConfigInvalidInterval
                | ErrorCode::ConfigInvalidUrl
                | ErrorCode::ConfigDuplicateMetric
                | ErrorCode::ConfigMetricsError
        )
    }

    pub fn is_network_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::HttpBadRequest
                | ErrorCode::HttpUnauthorized
                | ErrorCode::HttpForbidden
                | ErrorCode::HttpRateLimited
                | ErrorCode::HttpServerError
                | ErrorCode::HttpTimeout
                | ErrorCode::HttpNetworkError
                | ErrorCode::HttpInvalidResponse
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, FloptError>;
