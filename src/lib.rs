//! Kypria - multi-component orchestration core
//!
//! A process-internal coordinator for a small set of cooperating
//! components. It tracks their alignment, drives a periodic control cycle
//! that drains a priority queue of short-lived coordinated tasks
//! ("rituals"), and keeps a bounded set of decaying signals ("echoes")
//! with delayed harmonic follow-ups.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and collaborator ports
//! - **Service Layer** (`services`): event bus, registry, rituals, echoes,
//!   alignment control and the orchestrator that ties them together
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kypria::{Config, EventBus, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = Arc::new(EventBus::default());
//!     let orchestrator = Orchestrator::new(Config::default(), bus).await;
//!     orchestrator.register_component("codex", "chronicler", 0.8).await?;
//!     let report = orchestrator.run_cycle().await;
//!     println!("alignment {}", report.evaluation.alignment);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Component, ComponentStatus, Config, ConvergenceState, Echo, EchoPattern, Ritual, RitualKind,
    RitualOutcome, RitualPriority, RitualStatus,
};
pub use domain::ports::{Chronicler, Herald};
pub use domain::{OrchestrationError, OrchestrationResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ComponentRegistry, EchoEngine, EventBus, EventPayload, OrchestrationDaemon, Orchestrator,
    RitualManager,
};
