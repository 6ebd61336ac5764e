//! Core Components
//!
//! External capabilities consumed by the lifecycle: HTTP transport, the
//! query capability and datastore row access.

pub mod datastore;
pub mod query;
pub mod transport;

pub use datastore::*;
pub use query::*;
pub use transport::*;
