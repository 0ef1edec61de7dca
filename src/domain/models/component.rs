//! Component domain model.
//!
//! Components are the cooperating bots the orchestrator coordinates. Each
//! carries its own alignment score and a heartbeat refreshed by the cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag of the component whose documentation output feeds back into
/// its own alignment every cycle.
pub const DOCUMENTATION_KIND: &str = "chronicler";

/// Liveness of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Takes part in fan-out and alignment
    #[default]
    Active,
    /// Registered but ignored by fan-out and alignment
    Inactive,
}

impl ComponentStatus {
    /// Lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// A registered cooperating unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique registry key
    pub name: String,
    /// Category tag
    pub kind: String,
    /// Liveness
    pub status: ComponentStatus,
    /// Alignment score, always within `[0, 1]`.
    pub alignment: f64,
    /// Last time the cycle saw this component
    pub last_heartbeat: DateTime<Utc>,
}

impl Component {
    /// Create an active component with a clamped initial alignment.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, alignment: f64) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            status: ComponentStatus::Active,
            alignment: clamp_alignment(alignment),
            last_heartbeat: Utc::now(),
        }
    }

    /// Whether the component takes part in fan-out and alignment
    pub fn is_active(&self) -> bool {
        self.status == ComponentStatus::Active
    }

    /// Whether this component documents the system and self-updates its
    /// alignment from the manifested average.
    pub fn is_documentation(&self) -> bool {
        self.kind == DOCUMENTATION_KIND
    }

    /// Set alignment, clamped to `[0, 1]`
    pub fn set_alignment(&mut self, value: f64) {
        self.alignment = clamp_alignment(value);
    }
}

/// Clamp an alignment value into `[0, 1]`. NaN collapses to 0.
pub fn clamp_alignment(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
