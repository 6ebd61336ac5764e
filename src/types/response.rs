//! Response Types
//!
//! Caller-visible result of a lifecycle operation, handed to the routing
//! layer for rendering.

use serde::Serialize;

use crate::error::LifecycleError;
use crate::types::TokenMaterial;

/// Error payload, serialized as `{"error": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// Body of a lifecycle response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// No body.
    Empty,
    /// Raw access token string.
    AccessToken(String),
    /// Full token material.
    Token(TokenMaterial),
    /// Authorization request URL to redirect the user to.
    AuthorizationUrl(String),
    /// Error payload.
    Error(ErrorPayload),
}

/// Status and body returned by every lifecycle operation.
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: ResponseBody,
}

impl LifecycleResponse {
    /// 200 with no body.
    pub fn ok() -> Self {
        Self::new(200, ResponseBody::Empty)
    }

    /// 204 with no body.
    pub fn no_content() -> Self {
        Self::new(204, ResponseBody::Empty)
    }

    /// 200 with a raw access token.
    pub fn access_token(token: impl Into<String>) -> Self {
        Self::new(200, ResponseBody::AccessToken(token.into()))
    }

    /// 200 with token material.
    pub fn token(material: TokenMaterial) -> Self {
        Self::new(200, ResponseBody::Token(material))
    }

    /// 200 with an authorization URL.
    pub fn authorization_url(url: impl Into<String>) -> Self {
        Self::new(200, ResponseBody::AuthorizationUrl(url.into()))
    }

    /// Error payload with an explicit status.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(
            status,
            ResponseBody::Error(ErrorPayload {
                error: message.into(),
            }),
        )
    }

    fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, body }
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error message, if this is an error response.
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Error(payload) => Some(&payload.error),
            _ => None,
        }
    }

    /// Body rendered as JSON; `None` for empty and plain-string bodies.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        match &self.body {
            ResponseBody::Token(material) => serde_json::to_value(material).ok(),
            ResponseBody::Error(payload) => serde_json::to_value(payload).ok(),
            _ => None,
        }
    }
}

impl From<&LifecycleError> for LifecycleResponse {
    fn from(error: &LifecycleError) -> Self {
        let message = match error {
            LifecycleError::Validation(inner) => inner.to_string(),
            other => other.to_string(),
        };
        Self::error(error.status_code(), message)
    }
}
