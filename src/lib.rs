//! OAuth2 Token Lifecycle
//!
//! Keeps OAuth2 credentials for end users and service identities in a
//! schema-on-demand datastore and refreshes them before they expire.
//!
//! # Features
//!
//! - Authorization Code Flow (RFC 6749 Section 4.1) with optional persistence
//! - Client Credentials Flow (RFC 6749 Section 4.4) with a shared stored token
//! - Token Refresh (RFC 6749 Section 6) with a look-ahead window
//! - Lazy provisioning of the token table and its columns
//! - Optional inner authorization probe against a downstream resource server
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth2_token_lifecycle::{
//!     lifecycle_config, CallerContext, LifecycleOrchestrator, ProviderConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = lifecycle_config()
//!         .callback_url("https://functions.example.com/{}/auth/callback")
//!         .provider(ProviderConfig {
//!             authorize_host: "https://provider.example.com".to_string(),
//!             authorize_path: "/oauth/authorize".to_string(),
//!             token_host: "https://provider.example.com".to_string(),
//!             token_path: "/oauth/token".to_string(),
//!         })
//!         .datastore_endpoint("https://datastore.example.com/graphql")
//!         .from_env()
//!         .build()?;
//!
//!     let lifecycle = LifecycleOrchestrator::new(config)?;
//!
//!     let response = lifecycle.refresh(&CallerContext::user("alice")).await;
//!     println!("{} {:?}", response.status, response.body);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: token records, token material, configuration and responses
//! - `error`: error hierarchy with status mapping
//! - `core`: HTTP transport, query capability and datastore rows
//! - `schema`: token table definition and provisioning
//! - `token`: token store, refresh policy and inner authorization probe
//! - `flows`: OAuth provider grants
//! - `builders`: fluent configuration builder
//! - `lifecycle`: the orchestrator exposing the lifecycle operations

pub mod builders;
pub mod core;
pub mod error;
pub mod flows;
pub mod lifecycle;
pub mod schema;
pub mod token;
pub mod types;

// Re-export orchestrator
pub use lifecycle::{
    CallerContext, LifecycleOrchestrator, StorageIdentity, StoreTokenRequest,
    CLIENT_CREDENTIALS_FAILED_MESSAGE, REFRESH_FAILED_MESSAGE,
};

// Re-export builders
pub use builders::{lifecycle_config, LifecycleConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_response, map_token_error, parse_error_response, ConfigurationError,
    LifecycleError, LifecycleResult, NetworkError, OAuth2ErrorResponse, ProtocolError,
    ProviderError, ProvisionError, StoreError, ValidationError,
};

// Re-export types
pub use types::{
    // Config
    AuthorizeParams, ClientAuthMethod, ClientCredentials, DatastoreConfig,
    InnerAuthorizationConfig, LifecycleConfig, ProviderConfig, ServiceAccountScope,
    // Record
    valid_forever_expiry, ErrorCode, TokenFields, TokenRecord, CLIENT_CREDENTIALS_EXTERNAL_KEY,
    SERVICE_ACCOUNT_EXTERNAL_KEY,
    // Token
    TokenMaterial,
    // Response
    ErrorPayload, LifecycleResponse, ResponseBody,
};

// Re-export core components
pub use crate::core::{
    // Transport
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport,
    // Query
    GraphQlQueryClient, MockQueryClient, QueryClient, QueryError, QueryFailure, QueryRequest,
    QueryResponse,
    // Datastore
    Datastore, GraphQlDatastore, InMemoryDatastore, MockDatastore, NOT_FOUND_MARKER,
};

// Re-export schema
pub use schema::{missing_columns, ColumnDefinition, SchemaProvisioner, REQUIRED_COLUMNS, TOKEN_TABLE_NAME};

// Re-export flows
pub use flows::{HttpOAuthProvider, MockOAuthProvider, OAuthProvider};

// Re-export token management
pub use token::{InnerAuthorizationProbe, RefreshDecision, RefreshPolicy, TokenStore};
