//! Lifecycle Orchestrator
//!
//! Composes provisioning, storage, refresh policy, the inner authorization
//! probe and the OAuth provider into the externally visible operations.
//!
//! Every operation returns a [`LifecycleResponse`](crate::types::LifecycleResponse); errors are mapped to a
//! status and `{error}` payload at this boundary and never escape.

mod refresh;
mod session;

pub use session::StoreTokenRequest;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

use crate::core::{
    Datastore, GraphQlDatastore, GraphQlQueryClient, HttpTransport, QueryClient,
    ReqwestHttpTransport, DEFAULT_MAX_RESPONSE_SIZE,
};
use crate::error::{ConfigurationError, LifecycleResult, ProtocolError, ValidationError};
use crate::flows::{HttpOAuthProvider, OAuthProvider};
use crate::schema::SchemaProvisioner;
use crate::token::{InnerAuthorizationProbe, RefreshPolicy, TokenStore};
use crate::types::{
    LifecycleConfig, ServiceAccountScope, TokenMaterial, SERVICE_ACCOUNT_EXTERNAL_KEY,
};

/// Message returned when the provider rejects a refresh.
pub const REFRESH_FAILED_MESSAGE: &str = "The authorization code/refresh token is expired or invalid/redirect_uri must have the same value as in the authorization request.";

/// Message returned when the client credentials token cannot be renewed.
pub const CLIENT_CREDENTIALS_FAILED_MESSAGE: &str = "Refresh client credentials token failed";

/// Fill in the expiry of provider-issued material. An expiry that cannot be
/// represented is a malformed provider response.
fn normalize_issued(
    material: TokenMaterial,
    now: DateTime<Utc>,
) -> LifecycleResult<TokenMaterial> {
    material.normalized(now).map_err(|e| {
        ProtocolError::InvalidResponse {
            message: e.to_string(),
        }
        .into()
    })
}

/// Identity of the caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerContext {
    /// Authenticated username.
    pub username: String,
    /// Caller asked to act as the service account.
    pub service_account: bool,
}

impl CallerContext {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            service_account: false,
        }
    }

    pub fn service_account(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            service_account: true,
        }
    }
}

/// Where a caller's token is stored and whether it is echoed back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageIdentity {
    pub external_id: String,
    pub return_token_back: bool,
}

/// Token lifecycle orchestrator.
pub struct LifecycleOrchestrator<
    Q: QueryClient = GraphQlQueryClient,
    D: Datastore = GraphQlDatastore<GraphQlQueryClient>,
    P: OAuthProvider = HttpOAuthProvider,
    T: HttpTransport = ReqwestHttpTransport,
> {
    config: LifecycleConfig,
    provisioner: SchemaProvisioner<Q>,
    datastore: Arc<D>,
    provider: Arc<P>,
    probe: Option<InnerAuthorizationProbe<T>>,
    policy: RefreshPolicy,
}

impl LifecycleOrchestrator {
    /// Orchestrator over the GraphQL datastore and the HTTP provider.
    pub fn new(config: LifecycleConfig) -> LifecycleResult<Self> {
        let endpoint = config.datastore.endpoint.clone().ok_or_else(|| {
            ConfigurationError::MissingField {
                field: "datastore.endpoint".to_string(),
            }
        })?;

        let transport = Arc::new(ReqwestHttpTransport::with_options(
            config.timeout,
            DEFAULT_MAX_RESPONSE_SIZE,
        )?);

        let mut query = GraphQlQueryClient::new(endpoint, transport.clone()).with_timeout(config.timeout);
        if let Some(token) = config.datastore.api_token.clone() {
            query = query.with_api_token(token);
        }
        let query = Arc::new(query);
        let datastore = Arc::new(GraphQlDatastore::new(query.clone()));
        let provider = Arc::new(HttpOAuthProvider::new(&config, transport.clone()));

        Ok(Self::with_components(config, query, datastore, provider, transport))
    }
}

impl<Q, D, P, T> LifecycleOrchestrator<Q, D, P, T>
where
    Q: QueryClient,
    D: Datastore,
    P: OAuthProvider,
    T: HttpTransport,
{
    /// Orchestrator over explicit capabilities.
    pub fn with_components(
        config: LifecycleConfig,
        query: Arc<Q>,
        datastore: Arc<D>,
        provider: Arc<P>,
        transport: Arc<T>,
    ) -> Self {
        let provisioner = SchemaProvisioner::new(query, config.application_node_id());
        let probe = config
            .inner_authorization
            .clone()
            .map(|probe| InnerAuthorizationProbe::new(probe, transport).with_timeout(config.timeout));
        let policy = RefreshPolicy::new(config.refresh_window);

        Self {
            config,
            provisioner,
            datastore,
            provider,
            probe,
            policy,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &SchemaProvisioner<Q> {
        &self.provisioner
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Storage key for `caller`.
    ///
    /// Service accounts share one key unless configured per caller, and never
    /// get token material back.
    pub fn storage_identity(&self, caller: &CallerContext) -> LifecycleResult<StorageIdentity> {
        if caller.service_account {
            let external_id = match self.config.service_account {
                ServiceAccountScope::Shared => SERVICE_ACCOUNT_EXTERNAL_KEY.to_string(),
                ServiceAccountScope::PerCaller if !caller.username.is_empty() => {
                    format!("{}:{}", SERVICE_ACCOUNT_EXTERNAL_KEY, caller.username)
                }
                ServiceAccountScope::PerCaller => return Err(ValidationError::MissingIdentity.into()),
            };
            return Ok(StorageIdentity {
                external_id,
                return_token_back: false,
            });
        }

        if caller.username.is_empty() {
            return Err(ValidationError::MissingIdentity.into());
        }
        Ok(StorageIdentity {
            external_id: caller.username.clone(),
            return_token_back: true,
        })
    }

    /// Callback URL with `params` appended to its query.
    fn redirect_uri(&self, params: &[(&str, &str)]) -> LifecycleResult<String> {
        if params.is_empty() {
            return Ok(self.config.callback_url.clone());
        }

        let mut url = Url::parse(&self.config.callback_url).map_err(|_| {
            ConfigurationError::InvalidEndpoint {
                url: self.config.callback_url.clone(),
            }
        })?;
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        Ok(url.to_string())
    }

    /// Provision the table and open the store on it.
    async fn token_store(&self) -> LifecycleResult<TokenStore<D>> {
        let table_id = self.provisioner.ensure_table().await?;
        Ok(TokenStore::new(self.datastore.clone(), table_id))
    }
}
