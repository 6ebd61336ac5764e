//! Lifecycle Error Types
//!
//! Error hierarchy for provisioning, storage, provider exchange and
//! inner-authorization failures.

use std::time::Duration;
use thiserror::Error;

/// Root error type for token lifecycle operations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No token record found for {external_id}")]
    NotFound { external_id: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Token rejected by inner authorization at {url}")]
    DownstreamRejection { url: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl LifecycleError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "LIFECYCLE_CONFIG",
            Self::Provision(_) => "LIFECYCLE_PROVISION",
            Self::Store(_) => "LIFECYCLE_STORE",
            Self::NotFound { .. } => "LIFECYCLE_NOT_FOUND",
            Self::Provider(_) => "LIFECYCLE_PROVIDER",
            Self::Validation(_) => "LIFECYCLE_VALIDATION",
            Self::DownstreamRejection { .. } => "LIFECYCLE_DOWNSTREAM_REJECTION",
            Self::Network(_) => "LIFECYCLE_NETWORK",
            Self::Protocol(_) => "LIFECYCLE_PROTOCOL",
        }
    }

    /// Default caller-visible HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } | Self::Provider(_) | Self::DownstreamRejection { .. } => 401,
            Self::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Check if the session behind this error must be re-authorized.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::DownstreamRejection { .. } => true,
            Self::Provider(ProviderError::InvalidGrant { .. }) => true,
            Self::Provider(ProviderError::InvalidClient { .. }) => true,
            _ => false,
        }
    }

    /// Check if this error means the identity has no stored record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Table or column provisioning failure.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Table lookup failed: {message}")]
    LookupFailed { message: String },

    #[error("Table creation failed: {message}")]
    TableCreationFailed { message: String },

    #[error("Column creation failed for {columns:?}: {message}")]
    ColumnCreationFailed {
        columns: Vec<String>,
        message: String,
    },
}

/// Token row read/write failure other than not-found.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Corrupted data: {message}")]
    CorruptedData { message: String },
}

/// Provider (OAuth2 server) error.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid scope: {scope}")]
    InvalidScope { scope: String },

    #[error("Unauthorized client for this grant type")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable { retry_after: Option<Duration> },
}

/// Caller-supplied input rejected before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid request method - please use POST or PUT")]
    InvalidMethod { method: String },

    #[error("Missing request body")]
    MissingBody,

    #[error("Malformed request body: {message}")]
    MalformedBody { message: String },

    #[error("Missing token body in request")]
    MissingToken,

    #[error("Missing required token field: {field}")]
    MissingTokenField { field: String },

    #[error("Token expires_in out of range: {expires_in}")]
    ExpiresInOutOfRange { expires_in: u64 },

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Missing external identity")]
    MissingIdentity,
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// OAuth2 error response from provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Map token endpoint error response to error type.
pub fn map_token_error(response: &OAuth2ErrorResponse) -> ProviderError {
    let description = || {
        response
            .error_description
            .clone()
            .unwrap_or_else(|| response.error.clone())
    };

    match response.error.as_str() {
        "invalid_client" => ProviderError::InvalidClient {
            error_description: response.error_description.clone(),
        },
        "invalid_grant" => ProviderError::InvalidGrant {
            message: description(),
        },
        "invalid_scope" => ProviderError::InvalidScope {
            scope: response.error_description.clone().unwrap_or_default(),
        },
        "unauthorized_client" => ProviderError::UnauthorizedClient {
            error_description: response.error_description.clone(),
        },
        "unsupported_grant_type" => ProviderError::UnsupportedGrantType {
            grant_type: response.error_description.clone().unwrap_or_default(),
        },
        "server_error" => ProviderError::ServerError {
            message: description(),
        },
        "temporarily_unavailable" => ProviderError::TemporarilyUnavailable { retry_after: None },
        _ => ProviderError::InvalidRequest {
            message: description(),
        },
    }
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create error from a non-success token endpoint response.
pub fn create_error_from_response(status: u16, body: &str) -> LifecycleError {
    if let Some(response) = parse_error_response(body) {
        return LifecycleError::Provider(map_token_error(&response));
    }

    let error = match status {
        400 => ProviderError::InvalidRequest {
            message: "Bad request".to_string(),
        },
        401 => ProviderError::InvalidClient {
            error_description: Some("Unauthorized".to_string()),
        },
        403 => ProviderError::UnauthorizedClient {
            error_description: Some("Forbidden".to_string()),
        },
        429 => ProviderError::TemporarilyUnavailable {
            retry_after: Some(Duration::from_secs(60)),
        },
        _ => ProviderError::ServerError {
            message: format!("HTTP {}", status),
        },
    };

    LifecycleError::Provider(error)
}
