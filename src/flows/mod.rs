//! OAuth2 Flows
//!
//! Grants used by the token lifecycle.
//!
//! - **Authorization Code Flow** (RFC 6749 Section 4.1): authorization URL and code exchange
//! - **Client Credentials Flow** (RFC 6749 Section 4.4): service-to-service tokens
//! - **Refresh** (RFC 6749 Section 6): renewing an access token

pub mod authorization_code;
pub mod provider;
pub mod token_endpoint;

pub use authorization_code::build_authorization_url;
pub use provider::{HttpOAuthProvider, MockOAuthProvider, OAuthProvider};
pub use token_endpoint::{Grant, TokenEndpoint};
