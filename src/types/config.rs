//! Configuration Types
//!
//! Lifecycle configuration, constructed once and owned by the orchestrator.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::HttpMethod;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default look-ahead before expiry at which tokens are refreshed.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(300);

/// Token lifecycle configuration.
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Application that owns the token table.
    pub application_id: String,
    /// Callback URL registered with the provider.
    pub callback_url: String,
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// Provider endpoints.
    pub provider: ProviderConfig,
    /// Parameters added to the authorization request.
    pub authorize_params: AuthorizeParams,
    /// Scope requested by the client-credentials grant.
    pub token_scope: Option<String>,
    /// Optional downstream validation of stored tokens.
    pub inner_authorization: Option<InnerAuthorizationConfig>,
    /// Refresh tokens this long before they expire.
    pub refresh_window: chrono::Duration,
    /// How service-account callers map to stored identities.
    pub service_account: ServiceAccountScope,
    /// Persist tokens as part of the authorization-code callback.
    pub persist_on_exchange: bool,
    /// Datastore connection settings.
    pub datastore: DatastoreConfig,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl LifecycleConfig {
    /// Node id of the owning application.
    pub fn application_node_id(&self) -> String {
        format!("Application:{}", self.application_id)
    }
}

/// OAuth2 provider endpoint configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Base host for authorization.
    pub authorize_host: String,
    /// Path on `authorize_host` for authorization.
    #[serde(default = "default_authorize_path")]
    pub authorize_path: String,
    /// Base host for the token endpoint.
    pub token_host: String,
    /// Path on `token_host` for token requests.
    #[serde(default = "default_token_path")]
    pub token_path: String,
}

fn default_authorize_path() -> String {
    "/oauth/authorize".to_string()
}

fn default_token_path() -> String {
    "/oauth/token".to_string()
}

impl ProviderConfig {
    /// Full authorization endpoint URL.
    pub fn authorization_endpoint(&self) -> String {
        join_url(&self.authorize_host, &self.authorize_path)
    }

    /// Full token endpoint URL.
    pub fn token_endpoint(&self) -> String {
        join_url(&self.token_host, &self.token_path)
    }
}

fn join_url(host: &str, path: &str) -> String {
    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Client credentials for OAuth2 authentication.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: Option<SecretString>,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_method: ClientAuthMethod::ClientSecretBasic,
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    #[default]
    ClientSecretBasic,
}

/// Authorization request parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthorizeParams {
    /// Requested scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Provider-specific query parameters (e.g. `page`).
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Inner authorization probe settings.
#[derive(Clone, Debug)]
pub struct InnerAuthorizationConfig {
    /// Downstream resource probed with the stored access token.
    pub url: String,
    /// Request method.
    pub method: HttpMethod,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Replace rejected credentials with the empty placeholder.
    pub remove_credentials: bool,
}

impl InnerAuthorizationConfig {
    /// GET probe against `url` that removes rejected credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            remove_credentials: true,
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn remove_credentials(mut self, remove: bool) -> Self {
        self.remove_credentials = remove;
        self
    }
}

/// Storage identity used for service-account callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceAccountScope {
    /// One token shared by every service-account caller.
    #[default]
    Shared,
    /// One token per service-account caller.
    PerCaller,
}

/// Datastore connection settings.
#[derive(Clone, Default)]
pub struct DatastoreConfig {
    /// GraphQL endpoint.
    pub endpoint: Option<String>,
    /// Bearer token sent with each query.
    pub api_token: Option<SecretString>,
}

impl std::fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
