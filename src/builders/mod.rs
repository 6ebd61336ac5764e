//! Builders
//!
//! Fluent builder for lifecycle configuration.

pub mod config;

pub use config::{lifecycle_config, LifecycleConfigBuilder};
