//! Domain layer for the Kypria orchestration core
//!
//! Components, rituals, echoes and alignment, plus the ports through which
//! the core reaches its external collaborators.

pub mod errors;
/// Components, rituals, echoes, alignment and configuration
pub mod models;
pub mod ports;

pub use errors::{OrchestrationError, OrchestrationResult};
