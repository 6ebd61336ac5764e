//! Token Management
//!
//! Token persistence, refresh decisions and downstream validation.
//!
//! This module provides:
//!
//! - **Token Store**: one record per external identity on the provisioned table
//! - **Refresh Policy**: pure refresh decisions with a look-ahead window
//! - **Inner Authorization Probe**: fail-closed check against a resource server

pub mod policy;
pub mod probe;
pub mod store;

pub use policy::{RefreshDecision, RefreshPolicy};
pub use probe::InnerAuthorizationProbe;
pub use store::TokenStore;
