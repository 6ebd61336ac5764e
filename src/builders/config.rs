//! Configuration Builder
//!
//! Fluent builder for lifecycle configuration, with an environment overlay.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, LifecycleError};
use crate::types::{
    AuthorizeParams, ClientAuthMethod, ClientCredentials, DatastoreConfig,
    InnerAuthorizationConfig, LifecycleConfig, ProviderConfig, ServiceAccountScope,
    DEFAULT_REFRESH_WINDOW, DEFAULT_TIMEOUT,
};

/// Environment variable holding the OAuth client id.
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
/// Environment variable holding the owning application id.
pub const ENV_APP_ID: &str = "APP_ID";
/// Environment variable holding the deployed function name.
pub const ENV_FUNCTION_NAME: &str = "FUNCTION_NAME";

/// Placeholder in the callback URL replaced by the function name.
const FUNCTION_NAME_PLACEHOLDER: &str = "{}";

/// Lifecycle configuration builder.
pub struct LifecycleConfigBuilder {
    application_id: Option<String>,
    callback_url: Option<String>,
    function_name: Option<String>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    auth_method: ClientAuthMethod,
    provider: Option<ProviderConfig>,
    authorize_params: AuthorizeParams,
    token_scope: Option<String>,
    inner_authorization: Option<InnerAuthorizationConfig>,
    refresh_window: Duration,
    service_account: ServiceAccountScope,
    persist_on_exchange: bool,
    datastore: DatastoreConfig,
    timeout: Duration,
}

impl Default for LifecycleConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self {
            application_id: None,
            callback_url: None,
            function_name: None,
            client_id: None,
            client_secret: None,
            auth_method: ClientAuthMethod::default(),
            provider: None,
            authorize_params: AuthorizeParams::default(),
            token_scope: None,
            inner_authorization: None,
            refresh_window: DEFAULT_REFRESH_WINDOW,
            service_account: ServiceAccountScope::default(),
            persist_on_exchange: false,
            datastore: DatastoreConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overlay values from the process environment.
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Unset or empty variables leave the
    /// builder untouched.
    pub fn from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(client_id) = get(ENV_CLIENT_ID) {
            self.client_id = Some(client_id);
        }
        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            self.client_secret = Some(SecretString::new(secret));
        }
        if let Some(app_id) = get(ENV_APP_ID) {
            self.application_id = Some(app_id);
        }
        if let Some(function_name) = get(ENV_FUNCTION_NAME) {
            self.function_name = Some(function_name);
        }
        self
    }

    /// Set application id.
    pub fn application_id(mut self, id: impl Into<String>) -> Self {
        self.application_id = Some(id.into());
        self
    }

    /// Set callback URL. A `{}` placeholder is replaced by the function name.
    pub fn callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Set function name substituted into the callback URL.
    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    /// Set provider endpoints.
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set authorization request scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.authorize_params.scope = Some(scope.into());
        self
    }

    /// Add an extra authorization request parameter.
    pub fn authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.authorize_params.extra.insert(key.into(), value.into());
        self
    }

    /// Set scope requested by the client credentials grant.
    pub fn token_scope(mut self, scope: impl Into<String>) -> Self {
        self.token_scope = Some(scope.into());
        self
    }

    /// Enable the inner authorization probe.
    pub fn inner_authorization(mut self, config: InnerAuthorizationConfig) -> Self {
        self.inner_authorization = Some(config);
        self
    }

    pub fn refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn service_account_scope(mut self, scope: ServiceAccountScope) -> Self {
        self.service_account = scope;
        self
    }

    /// Persist tokens during the authorization code callback.
    pub fn persist_on_exchange(mut self, persist: bool) -> Self {
        self.persist_on_exchange = persist;
        self
    }

    /// Set datastore GraphQL endpoint.
    pub fn datastore_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.datastore.endpoint = Some(endpoint.into());
        self
    }

    /// Set datastore API token.
    pub fn datastore_token(mut self, token: impl Into<String>) -> Self {
        self.datastore.api_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the lifecycle configuration.
    pub fn build(self) -> Result<LifecycleConfig, LifecycleError> {
        let application_id = required(self.application_id, "application_id")?;
        let client_id = required(self.client_id, "client_id")?;
        let client_secret = self.client_secret.ok_or_else(|| missing("client_secret"))?;
        let provider = self.provider.ok_or_else(|| missing("provider"))?;

        let callback_template = required(self.callback_url, "callback_url")?;
        let callback_url = if callback_template.contains(FUNCTION_NAME_PLACEHOLDER) {
            let function_name = required(self.function_name, "function_name")?;
            callback_template.replacen(FUNCTION_NAME_PLACEHOLDER, &function_name, 1)
        } else {
            callback_template
        };

        validate_url(&callback_url)?;
        validate_url(&provider.authorization_endpoint())?;
        validate_url(&provider.token_endpoint())?;
        if let Some(endpoint) = &self.datastore.endpoint {
            validate_url(endpoint)?;
        }
        if let Some(probe) = &self.inner_authorization {
            validate_url(&probe.url)?;
        }
        let refresh_window = chrono::Duration::from_std(self.refresh_window).map_err(|_| {
            ConfigurationError::InvalidConfig {
                message: format!("refresh_window out of range: {:?}", self.refresh_window),
            }
        })?;

        Ok(LifecycleConfig {
            application_id,
            callback_url,
            credentials: ClientCredentials {
                client_id,
                client_secret: Some(client_secret),
                auth_method: self.auth_method,
            },
            provider,
            authorize_params: self.authorize_params,
            token_scope: self.token_scope,
            inner_authorization: self.inner_authorization,
            refresh_window,
            service_account: self.service_account,
            persist_on_exchange: self.persist_on_exchange,
            datastore: self.datastore,
            timeout: self.timeout,
        })
    }
}

fn missing(field: &str) -> LifecycleError {
    LifecycleError::Configuration(ConfigurationError::MissingField {
        field: field.to_string(),
    })
}

fn required(value: Option<String>, field: &str) -> Result<String, LifecycleError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| missing(field))
}

fn validate_url(url: &str) -> Result<(), LifecycleError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(LifecycleError::Configuration(
            ConfigurationError::InvalidEndpoint {
                url: url.to_string(),
            },
        )),
    }
}

/// Create new lifecycle configuration builder.
pub fn lifecycle_config() -> LifecycleConfigBuilder {
    LifecycleConfigBuilder::new()
}
