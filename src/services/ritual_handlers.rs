//! Built-in ritual handlers.
//!
//! Each handler talks to the outside world only through the
//! [`Chronicler`] and [`Herald`] ports. All of them are safe to run after
//! their ritual already completed by timeout.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use crate::domain::models::{Ritual, RitualKind};
use crate::domain::ports::{Announcement, ChronicleEntry, Chronicler, Herald};
use crate::services::echo_engine::EchoEngine;
use crate::services::ritual_manager::{RitualCompletion, RitualHandler, RitualManager};

/// Alignment a chronicle entry manifests when the payload names none.
const FULL_ALIGNMENT: f64 = 1.0;

fn payload_alignment(ritual: &Ritual) -> f64 {
    ritual
        .payload
        .get("alignment")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(FULL_ALIGNMENT)
}

/// Documents a convergence and echoes it across components.
pub struct ConvergenceRitual {
    chronicler: Arc<dyn Chronicler>,
    echoes: Arc<EchoEngine>,
}

impl ConvergenceRitual {
    /// Handler recording to `chronicler` and echoing on `echoes`
    pub fn new(chronicler: Arc<dyn Chronicler>, echoes: Arc<EchoEngine>) -> Self {
        Self { chronicler, echoes }
    }
}

#[async_trait]
impl RitualHandler for ConvergenceRitual {
    async fn perform(&self, ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()> {
        let entry = ChronicleEntry::new(
            "convergence",
            json!({
                "ritual_id": ritual.id,
                "participants": ritual.participants,
                "payload": ritual.payload,
            }),
            payload_alignment(&ritual),
        );
        self.chronicler
            .record(entry)
            .await
            .context("Failed to chronicle convergence")?;

        // A full echo set is backpressure, not a ritual failure
        if let Err(e) = self
            .echoes
            .create_echo("convergence", json!({ "ritual_id": ritual.id }))
            .await
        {
            tracing::warn!(ritual_id = %ritual.id, error = %e, "convergence echo dropped");
        }

        completion.complete();
        Ok(())
    }
}

/// Records the realignment goal and tells every participant about it.
pub struct AlignmentConvergenceRitual {
    chronicler: Arc<dyn Chronicler>,
    herald: Arc<dyn Herald>,
}

impl AlignmentConvergenceRitual {
    /// Handler recording the goal and announcing it
    pub fn new(chronicler: Arc<dyn Chronicler>, herald: Arc<dyn Herald>) -> Self {
        Self { chronicler, herald }
    }
}

#[async_trait]
impl RitualHandler for AlignmentConvergenceRitual {
    async fn perform(&self, ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()> {
        let goal = ritual
            .payload
            .get("goal")
            .and_then(serde_json::Value::as_f64)
            .context("alignment_convergence ritual carries no goal")?;

        self.chronicler
            .record(ChronicleEntry::new(
                "alignment_convergence",
                json!({ "ritual_id": ritual.id, "goal": goal }),
                payload_alignment(&ritual),
            ))
            .await
            .context("Failed to chronicle realignment goal")?;

        for participant in &ritual.participants {
            self.herald
                .announce(Announcement {
                    recipient: participant.clone(),
                    topic: RitualKind::AlignmentConvergence.to_string(),
                    message: format!("realign toward {goal:.2}"),
                })
                .await
                .with_context(|| format!("Failed to notify {participant}"))?;
        }

        completion.complete();
        Ok(())
    }
}

/// Announces a synchronization point to each participant.
pub struct SynchronizationRitual {
    herald: Arc<dyn Herald>,
}

impl SynchronizationRitual {
    /// Handler announcing through `herald`
    pub fn new(herald: Arc<dyn Herald>) -> Self {
        Self { herald }
    }
}

#[async_trait]
impl RitualHandler for SynchronizationRitual {
    async fn perform(&self, ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()> {
        let reason = ritual
            .payload
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("synchronization")
            .to_string();

        for participant in &ritual.participants {
            self.herald
                .announce(Announcement {
                    recipient: participant.clone(),
                    topic: reason.clone(),
                    message: format!("synchronize for {reason}"),
                })
                .await
                .with_context(|| format!("Failed to notify {participant}"))?;
        }

        completion.complete();
        Ok(())
    }
}

/// Writes a codex entry through the chronicler.
pub struct CodexUpdateRitual {
    chronicler: Arc<dyn Chronicler>,
}

impl CodexUpdateRitual {
    /// Handler recording to `chronicler`
    pub fn new(chronicler: Arc<dyn Chronicler>) -> Self {
        Self { chronicler }
    }
}

#[async_trait]
impl RitualHandler for CodexUpdateRitual {
    async fn perform(&self, ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()> {
        let subject = ritual
            .payload
            .get("subject")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("codex_update")
            .to_string();

        self.chronicler
            .record(ChronicleEntry::new(
                subject,
                ritual.payload.clone(),
                payload_alignment(&ritual),
            ))
            .await
            .context("Failed to write codex entry")?;

        completion.complete();
        Ok(())
    }
}

/// Register every built-in handler on `manager`.
pub async fn register_builtin_handlers(
    manager: &RitualManager,
    chronicler: Arc<dyn Chronicler>,
    herald: Arc<dyn Herald>,
    echoes: Arc<EchoEngine>,
) {
    manager
        .register_handler(
            RitualKind::Convergence.as_str(),
            Arc::new(ConvergenceRitual::new(chronicler.clone(), echoes)),
        )
        .await;
    manager
        .register_handler(
            RitualKind::AlignmentConvergence.as_str(),
            Arc::new(AlignmentConvergenceRitual::new(chronicler.clone(), herald.clone())),
        )
        .await;
    manager
        .register_handler(
            RitualKind::Synchronization.as_str(),
            Arc::new(SynchronizationRitual::new(herald)),
        )
        .await;
    manager
        .register_handler(
            RitualKind::CodexUpdate.as_str(),
            Arc::new(CodexUpdateRitual::new(chronicler)),
        )
        .await;
}
