//! Ritual domain model.
//!
//! A ritual is a short-lived task coordinated across components. It moves
//! through `queued -> executing -> active -> completed` exactly once and its
//! participant list only ever grows.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ritual; selects the handler and the completion deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RitualKind {
    /// Documents and echoes a convergence event.
    Convergence,
    /// Compensating ritual steering alignment back to the threshold.
    AlignmentConvergence,
    /// Fans a signal out to every participating component.
    Synchronization,
    /// Records an entry in the documentation codex.
    CodexUpdate,
    /// Any other kind; dispatched to the no-op handler.
    Other(String),
}

impl RitualKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &str {
        match self {
            Self::Convergence => "convergence_ritual",
            Self::AlignmentConvergence => "alignment_convergence",
            Self::Synchronization => "synchronization",
            Self::CodexUpdate => "codex_update",
            Self::Other(kind) => kind,
        }
    }

    /// Default completion deadline for this kind.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Convergence => Duration::from_secs(20),
            Self::AlignmentConvergence => Duration::from_secs(15),
            Self::Synchronization => Duration::from_secs(12),
            Self::CodexUpdate => Duration::from_secs(8),
            Self::Other(_) => Duration::from_secs(10),
        }
    }
}

impl From<String> for RitualKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "convergence_ritual" | "convergence" => Self::Convergence,
            "alignment_convergence" => Self::AlignmentConvergence,
            "synchronization" => Self::Synchronization,
            "codex_update" | "codex-update" => Self::CodexUpdate,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for RitualKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<RitualKind> for String {
    fn from(kind: RitualKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RitualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue priority class. High fully preempts normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RitualPriority {
    /// Served after every high entry
    #[default]
    Normal,
    /// Served before every normal entry
    High,
}

/// Lifecycle status of a ritual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RitualStatus {
    /// Waiting for a slot
    #[default]
    Queued,
    /// Admitted, handler not yet dispatched
    Executing,
    /// Handler dispatched
    Active,
    /// Finished; terminal
    Completed,
}

impl RitualStatus {
    /// Lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Whether no further transition exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether the ritual occupies a concurrency slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, Self::Executing | Self::Active)
    }

    /// The single status this one may advance to.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::Executing),
            Self::Executing => Some(Self::Active),
            Self::Active => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Whether `new_status` is the next step
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.next() == Some(new_status)
    }
}

/// How a ritual reached `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RitualOutcome {
    /// The handler signalled completion or finished cleanly.
    Fulfilled,
    /// The deadline elapsed first; the slot was released regardless.
    TimedOut,
    /// The handler returned an error or panicked.
    Faulted {
        /// Error text or panic message
        reason: String,
    },
}

/// A coordinated task spanning several components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ritual {
    /// Unique ritual id
    pub id: Uuid,
    /// Kind, which selects the handler
    pub kind: RitualKind,
    /// Opaque handler input
    pub payload: serde_json::Value,
    /// Component names taking part
    pub participants: Vec<String>,
    /// Lifecycle status
    pub status: RitualStatus,
    /// Queue priority
    pub priority: RitualPriority,
    /// When the ritual was built
    pub created_at: DateTime<Utc>,
    /// When it was admitted
    pub started_at: Option<DateTime<Utc>>,
    /// When it completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ritual {
    /// Queued, normal-priority ritual with no participants
    pub fn new(kind: impl Into<RitualKind>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            participants: Vec::new(),
            status: RitualStatus::Queued,
            priority: RitualPriority::Normal,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the queue priority
    pub fn with_priority(mut self, priority: RitualPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Append participants, skipping names already listed
    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in participants {
            self.add_participant(name);
        }
        self
    }

    /// Append a participant. Names already present are ignored, so the list
    /// only grows.
    pub fn add_participant(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.participants.contains(&name) {
            return false;
        }
        self.participants.push(name);
        true
    }

    /// Advance to the next status.
    pub fn transition_to(&mut self, new_status: RitualStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition ritual {} from {} to {}",
                self.id,
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        match new_status {
            RitualStatus::Executing => self.started_at = Some(Utc::now()),
            RitualStatus::Completed => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Whether the ritual jumps normal entries
    pub fn is_high_priority(&self) -> bool {
        self.priority == RitualPriority::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trips_through_string() {
        assert_eq!(RitualKind::from("convergence_ritual"), RitualKind::Convergence);
        assert_eq!(RitualKind::from("codex-update"), RitualKind::CodexUpdate);
        assert_eq!(
            RitualKind::from("moon_vigil"),
            RitualKind::Other("moon_vigil".to_string())
        );
        let encoded = serde_json::to_string(&RitualKind::AlignmentConvergence).unwrap();
        assert_eq!(encoded, "\"alignment_convergence\"");
    }

    #[test]
    fn test_default_timeouts_are_kind_specific() {
        assert_eq!(RitualKind::CodexUpdate.default_timeout(), Duration::from_secs(8));
        assert_eq!(RitualKind::Convergence.default_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        let mut ritual = Ritual::new(RitualKind::Synchronization, json!({}));
        assert!(ritual.transition_to(RitualStatus::Active).is_err());
        ritual.transition_to(RitualStatus::Executing).unwrap();
        assert!(ritual.started_at.is_some());
        ritual.transition_to(RitualStatus::Active).unwrap();
        assert!(ritual.transition_to(RitualStatus::Executing).is_err());
        ritual.transition_to(RitualStatus::Completed).unwrap();
        assert!(ritual.completed_at.is_some());
        assert!(ritual.status.is_terminal());
        assert!(ritual.transition_to(RitualStatus::Completed).is_err());
    }

    #[test]
    fn test_participants_only_grow() {
        let mut ritual =
            Ritual::new(RitualKind::Synchronization, json!({})).with_participants(["a", "b"]);
        assert!(!ritual.add_participant("a"));
        assert!(ritual.add_participant("c"));
        assert_eq!(ritual.participants, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_slot_holding_statuses() {
        assert!(!RitualStatus::Queued.holds_slot());
        assert!(RitualStatus::Executing.holds_slot());
        assert!(RitualStatus::Active.holds_slot());
        assert!(!RitualStatus::Completed.holds_slot());
    }
}
