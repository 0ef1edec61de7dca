use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".kypria";

/// Prefix for environment overrides; nested keys are split on `__`
pub const ENV_PREFIX: &str = "KYPRIA_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Cycle interval of zero
    #[error("Invalid cycle interval: {0}ms. Must be at least 1")]
    InvalidCycleInterval(u64),

    /// Threshold outside `(0, 1]`
    #[error("Invalid convergence threshold: {0}. Must be within (0, 1]")]
    InvalidThreshold(f64),

    /// History capacity of zero
    #[error("Invalid history capacity: {0}. Must be at least 1")]
    InvalidHistoryCapacity(usize),

    /// Concurrency ceiling of zero
    #[error("Invalid max_concurrent: {0}. Must be at least 1")]
    InvalidMaxConcurrent(usize),

    /// A per-kind ritual timeout of zero
    #[error("Invalid {kind} ritual timeout: {ms}ms. Must be at least 1")]
    InvalidTimeout {
        /// Timeout key, e.g. `synchronization`
        kind: &'static str,
        /// Configured value
        ms: u64,
    },

    /// Echo capacity of zero
    #[error("Invalid echo capacity: {0}. Must be at least 1")]
    InvalidEchoCapacity(usize),

    /// Echo tick interval of zero
    #[error("Invalid echo tick interval: {0}ms. Must be at least 1")]
    InvalidTickInterval(u64),

    /// Bus tap channel capacity of zero
    #[error("Invalid bus channel capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    /// Unrecognised tracing level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unrecognised log format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unrecognised file rotation policy
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// Any other rule violation, such as duplicate component names
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .kypria/config.yaml
    /// 3. .kypria/local.yaml (optional local overrides)
    /// 4. Environment variables (KYPRIA_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_in(".")
    }

    /// Same as [`ConfigLoader::load`], resolving `.kypria/` under `root`.
    pub fn load_in(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still
    /// apply on top.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.cycle.interval_ms == 0 {
            return Err(ConfigError::InvalidCycleInterval(config.cycle.interval_ms));
        }

        let threshold = config.cycle.convergence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        if config.cycle.history_capacity == 0 {
            return Err(ConfigError::InvalidHistoryCapacity(0));
        }

        if config.rituals.max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(0));
        }

        let timeouts = &config.rituals.timeouts;
        for (kind, ms) in [
            ("convergence", timeouts.convergence_ms),
            ("alignment_convergence", timeouts.alignment_convergence_ms),
            ("synchronization", timeouts.synchronization_ms),
            ("codex_update", timeouts.codex_update_ms),
            ("other", timeouts.other_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::InvalidTimeout { kind, ms });
            }
        }

        if config.echoes.capacity == 0 {
            return Err(ConfigError::InvalidEchoCapacity(0));
        }

        if config.echoes.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval(0));
        }

        if config.bus.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let mut names = HashSet::new();
        for component in &config.components {
            if component.name.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Component name cannot be empty".to_string(),
                ));
            }
            if !names.insert(component.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Component '{}' is listed more than once",
                    component.name
                )));
            }
            if !(0.0..=1.0).contains(&component.initial_alignment) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Component '{}' initial_alignment {} is outside [0, 1]",
                    component.name, component.initial_alignment
                )));
            }
        }

        Ok(())
    }
}
