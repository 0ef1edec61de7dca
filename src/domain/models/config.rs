use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alignment::DEFAULT_HISTORY_CAPACITY;
use super::ritual::RitualKind;

/// Main configuration structure for Kypria
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Orchestration cycle and convergence settings
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Ritual queue and execution settings
    #[serde(default)]
    pub rituals: RitualConfig,

    /// Echo resonance settings
    #[serde(default)]
    pub echoes: EchoConfig,

    /// Event bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Components registered at startup
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

/// Orchestration cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CycleConfig {
    /// Milliseconds between orchestration cycles
    #[serde(default = "default_cycle_interval_ms")]
    pub interval_ms: u64,

    /// Aggregate alignment at or above which the system is converged
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Number of alignment samples kept for observability
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

const fn default_cycle_interval_ms() -> u64 {
    5000
}

const fn default_convergence_threshold() -> f64 {
    0.85
}

const fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_cycle_interval_ms(),
            convergence_threshold: default_convergence_threshold(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl CycleConfig {
    /// Cycle interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Ritual execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RitualConfig {
    /// Maximum rituals executing or active at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-kind completion deadlines
    #[serde(default)]
    pub timeouts: RitualTimeouts,
}

const fn default_max_concurrent() -> usize {
    5
}

impl Default for RitualConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeouts: RitualTimeouts::default(),
        }
    }
}

/// Completion deadlines per ritual kind, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RitualTimeouts {
    /// Deadline for `convergence_ritual`
    #[serde(default = "default_convergence_ms")]
    pub convergence_ms: u64,
    /// Deadline for `alignment_convergence`
    #[serde(default = "default_alignment_convergence_ms")]
    pub alignment_convergence_ms: u64,
    /// Deadline for `synchronization`
    #[serde(default = "default_synchronization_ms")]
    pub synchronization_ms: u64,
    /// Deadline for `codex_update`
    #[serde(default = "default_codex_update_ms")]
    pub codex_update_ms: u64,
    /// Deadline for any other kind
    #[serde(default = "default_other_ms")]
    pub other_ms: u64,
}

fn kind_default_ms(kind: &RitualKind) -> u64 {
    u64::try_from(kind.default_timeout().as_millis()).unwrap_or(u64::MAX)
}

fn default_convergence_ms() -> u64 {
    kind_default_ms(&RitualKind::Convergence)
}

fn default_alignment_convergence_ms() -> u64 {
    kind_default_ms(&RitualKind::AlignmentConvergence)
}

fn default_synchronization_ms() -> u64 {
    kind_default_ms(&RitualKind::Synchronization)
}

fn default_codex_update_ms() -> u64 {
    kind_default_ms(&RitualKind::CodexUpdate)
}

fn default_other_ms() -> u64 {
    kind_default_ms(&RitualKind::Other(String::new()))
}

impl Default for RitualTimeouts {
    fn default() -> Self {
        Self {
            convergence_ms: default_convergence_ms(),
            alignment_convergence_ms: default_alignment_convergence_ms(),
            synchronization_ms: default_synchronization_ms(),
            codex_update_ms: default_codex_update_ms(),
            other_ms: default_other_ms(),
        }
    }
}

impl RitualTimeouts {
    /// Deadline for a ritual of the given kind
    pub fn timeout_for(&self, kind: &RitualKind) -> Duration {
        let ms = match kind {
            RitualKind::Convergence => self.convergence_ms,
            RitualKind::AlignmentConvergence => self.alignment_convergence_ms,
            RitualKind::Synchronization => self.synchronization_ms,
            RitualKind::CodexUpdate => self.codex_update_ms,
            RitualKind::Other(_) => self.other_ms,
        };
        Duration::from_millis(ms)
    }

    /// Same deadline for every kind (handy in tests)
    pub fn uniform(ms: u64) -> Self {
        Self {
            convergence_ms: ms,
            alignment_convergence_ms: ms,
            synchronization_ms: ms,
            codex_update_ms: ms,
            other_ms: ms,
        }
    }
}

/// Echo resonance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EchoConfig {
    /// Maximum echoes held at once
    #[serde(default = "default_echo_capacity")]
    pub capacity: usize,

    /// Delay before harmonic notifications fire, in milliseconds
    #[serde(default = "default_harmonic_delay_ms")]
    pub harmonic_delay_ms: u64,

    /// Milliseconds between decay and cleanup ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

const fn default_echo_capacity() -> usize {
    10
}

const fn default_harmonic_delay_ms() -> u64 {
    500
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            capacity: default_echo_capacity(),
            harmonic_delay_ms: default_harmonic_delay_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl EchoConfig {
    /// Harmonic delay as a [`Duration`]
    pub fn harmonic_delay(&self) -> Duration {
        Duration::from_millis(self.harmonic_delay_ms)
    }

    /// Tick interval as a [`Duration`]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Capacity of the broadcast tap used by observers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    1024
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// A component registered at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ComponentConfig {
    /// Registry key
    pub name: String,
    /// Category tag
    pub kind: String,
    /// Starting alignment, 0.5 when omitted
    #[serde(default = "default_initial_alignment")]
    pub initial_alignment: f64,
}

const fn default_initial_alignment() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cycle.interval(), Duration::from_secs(5));
        assert!((config.cycle.convergence_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.cycle.history_capacity, 100);
        assert_eq!(config.rituals.max_concurrent, 5);
        assert_eq!(config.echoes.capacity, 10);
        assert_eq!(config.echoes.harmonic_delay(), Duration::from_millis(500));
        assert_eq!(config.echoes.tick_interval(), Duration::from_secs(1));
        assert!(config.components.is_empty());
    }

    #[test]
    fn test_timeouts_per_kind() {
        let timeouts = RitualTimeouts::default();
        assert_eq!(timeouts.timeout_for(&RitualKind::CodexUpdate), Duration::from_secs(8));
        assert_eq!(
            timeouts.timeout_for(&RitualKind::Other("x".into())),
            Duration::from_secs(10)
        );
        let uniform = RitualTimeouts::uniform(50);
        assert_eq!(uniform.timeout_for(&RitualKind::Convergence), Duration::from_millis(50));
    }

    #[test]
    fn test_component_yaml() {
        let yaml = "
components:
  - name: codex
    kind: chronicler
    initial_alignment: 0.9
  - name: warden
    kind: moderation
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.components.len(), 2);
        assert!((config.components[1].initial_alignment - 0.5).abs() < f64::EPSILON);
    }
}
