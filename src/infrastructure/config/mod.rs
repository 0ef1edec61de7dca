//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading from `.kypria/`
//! - `KYPRIA_*` environment variable overrides
//! - Configuration validation

/// Layered figment loader and validation
pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR, ENV_PREFIX};
