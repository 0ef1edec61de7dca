pub mod alignment;
pub mod component;
/// Layered configuration model
pub mod config;
pub mod echo;
/// Two-class ritual queue
pub mod queue;
pub mod ritual;

pub use alignment::{mean_alignment, AlignmentHistory, AlignmentSample, ConvergenceState};
pub use component::{clamp_alignment, Component, ComponentStatus, DOCUMENTATION_KIND};
pub use config::{
    BusConfig, ComponentConfig, Config, CycleConfig, EchoConfig, LoggingConfig, RitualConfig,
    RitualTimeouts,
};
pub use echo::{Echo, EchoPattern, FrequencyClass, MAX_AMPLITUDE, REMOVAL_FLOOR, SILENCE_THRESHOLD};
pub use queue::RitualQueue;
pub use ritual::{Ritual, RitualKind, RitualOutcome, RitualPriority, RitualStatus};
