//! OAuth Provider
//!
//! The OAuth2 client capability used by the lifecycle: authorization URL,
//! code exchange, client credentials and refresh.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::core::{HttpTransport, ReqwestHttpTransport};
use crate::error::LifecycleResult;
use crate::flows::{build_authorization_url, Grant, TokenEndpoint};
use crate::types::{AuthorizeParams, LifecycleConfig, ProviderConfig, TokenMaterial};

/// OAuth2 client capability.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Authorization request URL redirecting back to `redirect_uri`.
    fn authorization_url(&self, redirect_uri: &str) -> LifecycleResult<String>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> LifecycleResult<TokenMaterial>;

    /// Request a token with the client credentials grant.
    async fn client_credentials(&self, scope: Option<&str>) -> LifecycleResult<TokenMaterial>;

    /// Refresh an access token.
    async fn refresh(&self, refresh_token: &str) -> LifecycleResult<TokenMaterial>;
}

/// Provider speaking the standard token endpoint protocol over HTTP.
pub struct HttpOAuthProvider<T: HttpTransport = ReqwestHttpTransport> {
    provider: ProviderConfig,
    client_id: String,
    authorize_params: AuthorizeParams,
    token_endpoint: TokenEndpoint<T>,
}

impl<T: HttpTransport> HttpOAuthProvider<T> {
    pub fn new(config: &LifecycleConfig, transport: Arc<T>) -> Self {
        Self {
            provider: config.provider.clone(),
            client_id: config.credentials.client_id.clone(),
            authorize_params: config.authorize_params.clone(),
            token_endpoint: TokenEndpoint::new(
                config.provider.token_endpoint(),
                config.credentials.clone(),
                config.timeout,
                transport,
            ),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> OAuthProvider for HttpOAuthProvider<T> {
    fn authorization_url(&self, redirect_uri: &str) -> LifecycleResult<String> {
        build_authorization_url(
            &self.provider.authorization_endpoint(),
            &self.client_id,
            redirect_uri,
            &self.authorize_params,
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> LifecycleResult<TokenMaterial> {
        self.token_endpoint
            .request(Grant::AuthorizationCode {
                code: code.to_string(),
                redirect_uri: redirect_uri.to_string(),
            })
            .await
    }

    async fn client_credentials(&self, scope: Option<&str>) -> LifecycleResult<TokenMaterial> {
        self.token_endpoint
            .request(Grant::ClientCredentials {
                scope: scope.map(str::to_string),
            })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> LifecycleResult<TokenMaterial> {
        self.token_endpoint
            .request(Grant::RefreshToken {
                refresh_token: refresh_token.to_string(),
            })
            .await
    }
}

/// Mock provider for testing.
///
/// Each grant answers from its own queue; an empty queue yields a default
/// mock token.
#[derive(Default)]
pub struct MockOAuthProvider {
    exchange_results: Mutex<VecDeque<LifecycleResult<TokenMaterial>>>,
    client_credentials_results: Mutex<VecDeque<LifecycleResult<TokenMaterial>>>,
    refresh_results: Mutex<VecDeque<LifecycleResult<TokenMaterial>>>,
    exchange_history: Mutex<Vec<(String, String)>>,
    client_credentials_history: Mutex<Vec<Option<String>>>,
    refresh_history: Mutex<Vec<String>>,
}

impl MockOAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_exchange(&self, result: LifecycleResult<TokenMaterial>) -> &Self {
        self.exchange_results.lock().unwrap().push_back(result);
        self
    }

    pub fn queue_client_credentials(&self, result: LifecycleResult<TokenMaterial>) -> &Self {
        self.client_credentials_results
            .lock()
            .unwrap()
            .push_back(result);
        self
    }

    pub fn queue_refresh(&self, result: LifecycleResult<TokenMaterial>) -> &Self {
        self.refresh_results.lock().unwrap().push_back(result);
        self
    }

    /// `(code, redirect_uri)` pairs passed to `exchange_code`.
    pub fn exchange_calls(&self) -> Vec<(String, String)> {
        self.exchange_history.lock().unwrap().clone()
    }

    pub fn client_credentials_calls(&self) -> Vec<Option<String>> {
        self.client_credentials_history.lock().unwrap().clone()
    }

    /// Refresh tokens passed to `refresh`.
    pub fn refresh_calls(&self) -> Vec<String> {
        self.refresh_history.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.exchange_calls().len()
            + self.client_credentials_calls().len()
            + self.refresh_calls().len()
    }

    fn mock_token(access_token: &str, refresh_token: Option<&str>) -> TokenMaterial {
        TokenMaterial {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            expires_at: None,
            refresh_token: refresh_token.map(str::to_string),
            scope: None,
            id_token: None,
            extra: HashMap::new(),
        }
    }
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    fn authorization_url(&self, redirect_uri: &str) -> LifecycleResult<String> {
        build_authorization_url(
            "https://mock.example.com/oauth/authorize",
            "mock-client",
            redirect_uri,
            &AuthorizeParams::default(),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> LifecycleResult<TokenMaterial> {
        self.exchange_history
            .lock()
            .unwrap()
            .push((code.to_string(), redirect_uri.to_string()));

        self.exchange_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Self::mock_token(
                    "mock-access-token",
                    Some("mock-refresh-token"),
                ))
            })
    }

    async fn client_credentials(&self, scope: Option<&str>) -> LifecycleResult<TokenMaterial> {
        self.client_credentials_history
            .lock()
            .unwrap()
            .push(scope.map(str::to_string));

        self.client_credentials_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::mock_token("mock-client-credentials-token", None)))
    }

    async fn refresh(&self, refresh_token: &str) -> LifecycleResult<TokenMaterial> {
        self.refresh_history
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        self.refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::mock_token("mock-refreshed-token", None)))
    }
}
