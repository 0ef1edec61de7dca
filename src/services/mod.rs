//! Orchestration services
//!
//! Each service owns one structure behind its own lock. The
//! [`Orchestrator`] ties them together per cycle.

pub mod alignment_controller;
pub mod component_registry;
pub mod echo_engine;
pub mod event_bus;
pub mod metrics;
pub mod orchestration_daemon;
pub mod orchestrator;
pub mod reactions;
pub mod ritual_handlers;
pub mod ritual_manager;

pub use alignment_controller::{AlignmentController, AlignmentEvaluation};
pub use component_registry::ComponentRegistry;
pub use echo_engine::{EchoEngine, EchoTickReport};
pub use event_bus::{
    topics, BusEvent, EventBus, EventBusConfig, EventId, EventPayload, EventSubscriber,
    FnSubscriber, SequenceNumber,
};
pub use metrics::{MetricsSnapshot, OrchestrationMetrics};
pub use orchestration_daemon::{
    DaemonConfig, DaemonStatus, OrchestrationDaemon, OrchestratorHandle, StopReason,
};
pub use orchestrator::{CycleReport, Orchestrator, OrchestratorStatus};
pub use reactions::{severity_gain, DomainReactions};
pub use ritual_handlers::{
    register_builtin_handlers, AlignmentConvergenceRitual, CodexUpdateRitual, ConvergenceRitual,
    SynchronizationRitual,
};
pub use ritual_manager::{NoopRitualHandler, RitualCompletion, RitualHandler, RitualManager};
