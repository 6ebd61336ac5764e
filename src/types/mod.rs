//! Lifecycle Types
//!
//! Core type definitions for token records, token material, configuration
//! and operation responses.

pub mod config;
pub mod record;
pub mod response;
pub mod token;

pub use config::*;
pub use record::*;
pub use response::*;
pub use token::*;
