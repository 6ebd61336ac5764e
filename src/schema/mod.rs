//! Storage Schema
//!
//! Token table definition and on-demand provisioning.

pub mod columns;
pub mod provisioner;
pub mod queries;

pub use columns::*;
pub use provisioner::*;
