//! Domain errors for the Kypria orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the orchestration core.
///
/// Registry misuse (`DuplicateComponent`, `UnknownComponent`) is a programmer
/// error and is never retried. `EchoCapacityExceeded` is backpressure: callers
/// log it and drop the echo. `RitualHandlerFault` is caught at the dispatch
/// boundary and never reaches the control cycle.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// `register` found the name already taken
    #[error("Component already registered: {0}")]
    DuplicateComponent(String),

    /// No component has this name
    #[error("Component not found: {0}")]
    UnknownComponent(String),

    /// The echo set is full
    #[error("Echo capacity exceeded: {active} of {capacity} echoes resonating, rejected {kind}")]
    EchoCapacityExceeded {
        /// Kind of the rejected echo
        kind: String,
        /// Echoes held at rejection
        active: usize,
        /// Configured ceiling
        capacity: usize,
    },

    /// No echo has this id
    #[error("Echo not found: {0}")]
    UnknownEcho(Uuid),

    /// A ritual handler returned an error or panicked
    #[error("Ritual {ritual_id} ({kind}) handler failed: {reason}")]
    RitualHandlerFault {
        /// Ritual that faulted
        ritual_id: Uuid,
        /// Its kind
        kind: String,
        /// Error text or panic message
        reason: String,
    },
}

impl OrchestrationError {
    /// Whether the error is expected backpressure rather than misuse.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::EchoCapacityExceeded { .. })
    }
}

/// Result alias for [`OrchestrationError`]
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
