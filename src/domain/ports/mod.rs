//! Port trait definitions (Hexagonal Architecture)
//!
//! Collaborators the orchestration core calls but does not implement:
//! - Chronicler: documentation and audit-trail creation
//! - Herald: cross-platform notification delivery
//!
//! Adapters for the real chat and payment providers implement these traits
//! outside this crate.

/// Documentation and audit-trail port
pub mod chronicler;
/// Notification port
pub mod herald;

pub use chronicler::{ChronicleEntry, Chronicler, InMemoryChronicler, DEFAULT_CHRONICLE_CAPACITY};
pub use herald::{Announcement, Herald, RecordingHerald, TracingHerald};
