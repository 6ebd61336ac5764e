//! Inner Authorization Probe
//!
//! Checks a stored access token against a downstream resource server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{HttpRequest, HttpTransport};
use crate::error::{LifecycleError, LifecycleResult};
use crate::types::InnerAuthorizationConfig;

/// Single-request liveness check of an access token.
///
/// Fails closed: network errors and non-2xx responses both count as
/// rejection.
pub struct InnerAuthorizationProbe<T: HttpTransport> {
    config: InnerAuthorizationConfig,
    transport: Arc<T>,
    timeout: Option<Duration>,
}

impl<T: HttpTransport> InnerAuthorizationProbe<T> {
    pub fn new(config: InnerAuthorizationConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Whether rejected credentials should be replaced by the empty placeholder.
    pub fn remove_credentials(&self) -> bool {
        self.config.remove_credentials
    }

    /// Returns `true` iff the downstream resource accepted `access_token`.
    pub async fn check(&self, access_token: &str) -> bool {
        self.verify(access_token).await.is_ok()
    }

    /// Like [`Self::check`], but reports a rejection as
    /// `LifecycleError::DownstreamRejection`.
    pub async fn verify(&self, access_token: &str) -> LifecycleResult<()> {
        let mut headers: HashMap<String, String> = self
            .config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", access_token),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        debug!(method = self.config.method.as_str(), url = %self.config.url, "probing inner authorization");

        let request = HttpRequest {
            method: self.config.method,
            url: self.config.url.clone(),
            headers,
            body: None,
            timeout: self.timeout,
        };

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => return Ok(()),
            Ok(response) => {
                warn!(url = %self.config.url, status = response.status, "inner authorization rejected token");
            }
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "inner authorization probe failed");
            }
        }

        Err(LifecycleError::DownstreamRejection {
            url: self.config.url.clone(),
        })
    }
}
