//! Reactions to inbound domain events.
//!
//! | topic             | echo                         | ritual                               |
//! |-------------------|------------------------------|--------------------------------------|
//! | `relic:triggered` | `relic_misfire`, by severity | `codex_update`, high at severity >= 5 |
//! | `badge:awarded`   | `badge_awarded`              | `synchronization`, normal            |
//! | `shrine:ping`     | `shrine_ping`, x1.3 on fail  | none                                 |
//! | `season:changed`  | `season_shift`               | `synchronization`, high              |
//!
//! Rituals are drained right away so they start as soon as a slot is free.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::models::{Ritual, RitualKind, RitualPriority};
use crate::services::echo_engine::EchoEngine;
use crate::services::event_bus::{topics, BusEvent, EventBus, EventPayload, EventSubscriber};
use crate::services::ritual_manager::RitualManager;

/// Severity at which echoes are amplified by [`MODERATE_GAIN`].
pub const MODERATE_SEVERITY: u32 = 3;
/// Severity at which echoes are amplified by [`SEVERE_GAIN`] and codex
/// rituals jump the queue.
pub const SEVERE_SEVERITY: u32 = 5;
/// Echo gain at [`MODERATE_SEVERITY`]
pub const MODERATE_GAIN: f64 = 1.3;
/// Echo gain at [`SEVERE_SEVERITY`]
pub const SEVERE_GAIN: f64 = 1.5;
/// Gain applied to the echo of a failed shrine ping.
pub const SHRINE_FAILURE_GAIN: f64 = 1.3;

/// Amplification for a reported severity; 1.0 means none.
pub fn severity_gain(severity: u32) -> f64 {
    if severity >= SEVERE_SEVERITY {
        SEVERE_GAIN
    } else if severity >= MODERATE_SEVERITY {
        MODERATE_GAIN
    } else {
        1.0
    }
}

/// Alignment a relic's codex entry manifests. Each misfire costs a tenth.
fn relic_alignment(severity: u32) -> f64 {
    (1.0 - f64::from(severity) / 10.0).max(0.0)
}

/// Turns inbound domain events into echoes and rituals.
pub struct DomainReactions {
    echoes: Arc<EchoEngine>,
    rituals: Arc<RitualManager>,
}

impl DomainReactions {
    /// Reactions feeding `echoes` and `rituals`
    pub fn new(echoes: Arc<EchoEngine>, rituals: Arc<RitualManager>) -> Self {
        Self { echoes, rituals }
    }

    /// Subscribe to every inbound topic.
    pub async fn attach(self: Arc<Self>, bus: &EventBus) {
        for topic in [
            topics::RELIC_TRIGGERED,
            topics::BADGE_AWARDED,
            topics::SHRINE_PING,
            topics::SEASON_CHANGED,
        ] {
            bus.subscribe(topic, self.clone()).await;
        }
    }

    async fn echo(&self, kind: &str, data: serde_json::Value, gain: f64) {
        // Capacity rejections are already logged by the engine
        let Ok(echo) = self.echoes.create_echo(kind, data).await else {
            return;
        };
        if gain > 1.0 {
            if let Err(e) = self.echoes.amplify(echo.id, gain).await {
                tracing::debug!(echo_id = %echo.id, error = %e, "echo gone before amplification");
            }
        }
    }

    async fn ritual(&self, ritual: Ritual) {
        self.rituals.enqueue(ritual).await;
        self.rituals.drain().await;
    }
}

#[async_trait]
impl EventSubscriber for DomainReactions {
    fn name(&self) -> &str {
        "domain-reactions"
    }

    async fn handle(&self, event: &BusEvent) -> anyhow::Result<()> {
        match &event.payload {
            EventPayload::RelicTriggered {
                relic_kind,
                severity,
                timestamp,
            } => {
                let data = json!({
                    "relic_kind": relic_kind,
                    "severity": severity,
                    "timestamp": timestamp,
                });
                self.echo("relic_misfire", data.clone(), severity_gain(*severity))
                    .await;

                let priority = if *severity >= SEVERE_SEVERITY {
                    RitualPriority::High
                } else {
                    RitualPriority::Normal
                };
                let mut payload = data;
                payload["subject"] = json!("relic_misfire");
                payload["alignment"] = json!(relic_alignment(*severity));
                self.ritual(Ritual::new(RitualKind::CodexUpdate, payload).with_priority(priority))
                    .await;
            }
            EventPayload::BadgeAwarded {
                badge_name,
                recipient,
                metadata,
            } => {
                self.echo(
                    "badge_awarded",
                    json!({ "badge_name": badge_name, "recipient": recipient, "metadata": metadata }),
                    1.0,
                )
                .await;
                self.ritual(Ritual::new(
                    RitualKind::Synchronization,
                    json!({ "reason": "badge_awarded", "badge_name": badge_name, "recipient": recipient }),
                ))
                .await;
            }
            EventPayload::ShrinePing {
                success,
                severity,
                timestamp,
            } => {
                let gain = if *success { 1.0 } else { SHRINE_FAILURE_GAIN };
                self.echo(
                    "shrine_ping",
                    json!({ "success": success, "severity": severity, "timestamp": timestamp }),
                    gain,
                )
                .await;
            }
            EventPayload::SeasonChanged { previous, current } => {
                let data = json!({ "previous": previous, "current": current });
                self.echo("season_shift", data.clone(), 1.0).await;

                let mut payload = data;
                payload["reason"] = json!("season_shift");
                self.ritual(
                    Ritual::new(RitualKind::Synchronization, payload)
                        .with_priority(RitualPriority::High),
                )
                .await;
            }
            other => {
                tracing::debug!(topic = %other.topic(), "no reaction for topic");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_gain_steps() {
        assert_eq!(severity_gain(0), 1.0);
        assert_eq!(severity_gain(2), 1.0);
        assert_eq!(severity_gain(3), MODERATE_GAIN);
        assert_eq!(severity_gain(4), MODERATE_GAIN);
        assert_eq!(severity_gain(5), SEVERE_GAIN);
        assert_eq!(severity_gain(40), SEVERE_GAIN);
    }

    #[test]
    fn test_relic_alignment_floors_at_zero() {
        assert!((relic_alignment(3) - 0.7).abs() < 1e-9);
        assert_eq!(relic_alignment(12), 0.0);
    }
}
