//! Echo resonance engine.
//!
//! Holds a bounded set of decaying echoes. Creation past capacity is
//! rejected outright. Harmonic follow-ups are published after a fixed delay
//! and are not counted against capacity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::{OrchestrationError, OrchestrationResult};
use crate::domain::models::{Echo, EchoConfig, EchoPattern};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::metrics::OrchestrationMetrics;

/// Result of one decay-and-sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EchoTickReport {
    /// Echoes that stopped resonating during this pass
    pub silenced: usize,
    /// Echoes dropped by the sweep
    pub removed: usize,
    /// Echoes still held after the sweep
    pub remaining: usize,
}

/// Holds resonating echoes and drives their decay, sweep and harmonics
pub struct EchoEngine {
    echoes: Mutex<HashMap<Uuid, Echo>>,
    config: EchoConfig,
    bus: Arc<EventBus>,
    metrics: Arc<OrchestrationMetrics>,
}

impl EchoEngine {
    /// Empty engine publishing on `bus`
    pub fn new(config: EchoConfig, bus: Arc<EventBus>, metrics: Arc<OrchestrationMetrics>) -> Self {
        Self {
            echoes: Mutex::new(HashMap::new()),
            config,
            bus,
            metrics,
        }
    }

    /// Maximum number of held echoes
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Create an echo using the built-in pattern for `kind`.
    pub async fn create_echo(
        &self,
        kind: &str,
        data: serde_json::Value,
    ) -> OrchestrationResult<Echo> {
        self.create_echo_with_pattern(kind, EchoPattern::for_kind(kind), data)
            .await
    }

    /// Create an echo with an explicit pattern.
    pub async fn create_echo_with_pattern(
        &self,
        kind: &str,
        pattern: EchoPattern,
        data: serde_json::Value,
    ) -> OrchestrationResult<Echo> {
        let echo = {
            let mut echoes = self.echoes.lock().await;
            if echoes.len() >= self.config.capacity {
                self.metrics.record_echo_rejected();
                let err = OrchestrationError::EchoCapacityExceeded {
                    kind: kind.to_string(),
                    active: echoes.len(),
                    capacity: self.config.capacity,
                };
                tracing::warn!(error = %err, "echo rejected");
                return Err(err);
            }
            let echo = Echo::new(kind, pattern, data, Utc::now());
            echoes.insert(echo.id, echo.clone());
            echo
        };

        self.metrics.record_echo_created();
        tracing::debug!(
            echo_id = %echo.id,
            kind = %echo.kind,
            amplitude = echo.amplitude,
            "echo created"
        );
        self.bus.publish(EventPayload::EchoCreated(echo.clone())).await;

        if !echo.pattern.harmonics.is_empty() {
            self.schedule_harmonics(&echo, self.config.harmonic_delay());
        }
        Ok(echo)
    }

    fn schedule_harmonics(&self, echo: &Echo, delay: Duration) {
        let bus = self.bus.clone();
        let metrics = self.metrics.clone();
        let echo_id = echo.id;
        let source_kind = echo.kind.clone();
        let harmonics = echo.pattern.harmonics.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for harmonic_kind in harmonics {
                tracing::debug!(%echo_id, source = %source_kind, harmonic = %harmonic_kind, "harmonic");
                bus.publish(EventPayload::EchoHarmonic {
                    echo_id,
                    source_kind: source_kind.clone(),
                    harmonic_kind,
                })
                .await;
                metrics.record_harmonic();
            }
        });
    }

    /// Multiply an echo's amplitude, capped at the maximum.
    pub async fn amplify(&self, echo_id: Uuid, multiplier: f64) -> OrchestrationResult<Echo> {
        let echo = {
            let mut echoes = self.echoes.lock().await;
            let echo = echoes
                .get_mut(&echo_id)
                .ok_or(OrchestrationError::UnknownEcho(echo_id))?;
            echo.amplify(multiplier);
            echo.clone()
        };

        self.metrics.record_echo_amplified();
        tracing::debug!(%echo_id, multiplier, amplitude = echo.amplitude, "echo amplified");
        self.bus.publish(EventPayload::EchoAmplified(echo.clone())).await;
        Ok(echo)
    }

    /// Recompute amplitudes for `now`. Returns how many echoes went silent.
    pub async fn decay_at(&self, now: DateTime<Utc>) -> usize {
        let mut echoes = self.echoes.lock().await;
        let mut silenced = 0;
        for echo in echoes.values_mut() {
            if echo.decay(now) {
                silenced += 1;
            }
        }
        if silenced > 0 {
            self.metrics.record_echoes_silenced(silenced as u64);
        }
        silenced
    }

    /// Drop echoes that expired or fell to the removal floor.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut echoes = self.echoes.lock().await;
        let before = echoes.len();
        echoes.retain(|_, e| !e.is_spent(now));
        let removed = before - echoes.len();
        if removed > 0 {
            self.metrics.record_echoes_expired(removed as u64);
            tracing::debug!(removed, remaining = echoes.len(), "echoes swept");
        }
        removed
    }

    /// One decay pass followed by one sweep, at `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> EchoTickReport {
        let silenced = self.decay_at(now).await;
        let removed = self.sweep_at(now).await;
        EchoTickReport {
            silenced,
            removed,
            remaining: self.len().await,
        }
    }

    /// [`Self::tick_at`] against the wall clock
    pub async fn tick(&self) -> EchoTickReport {
        self.tick_at(Utc::now()).await
    }

    /// Copy of one held echo
    pub async fn get(&self, echo_id: Uuid) -> Option<Echo> {
        self.echoes.lock().await.get(&echo_id).cloned()
    }

    /// All held echoes, oldest first.
    pub async fn snapshot(&self) -> Vec<Echo> {
        let mut echoes: Vec<Echo> = self.echoes.lock().await.values().cloned().collect();
        echoes.sort_by_key(|e| e.created_at);
        echoes
    }

    /// Number of held echoes, silenced ones included
    pub async fn len(&self) -> usize {
        self.echoes.lock().await.len()
    }

    /// Whether no echoes are held
    pub async fn is_empty(&self) -> bool {
        self.echoes.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FrequencyClass;
    use crate::services::event_bus::topics;
    use serde_json::json;

    fn engine(capacity: usize) -> (EchoEngine, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let config = EchoConfig {
            capacity,
            harmonic_delay_ms: 500,
            tick_interval_ms: 1000,
        };
        (
            EchoEngine::new(config, bus.clone(), Arc::new(OrchestrationMetrics::new())),
            bus,
        )
    }

    #[tokio::test]
    async fn test_capacity_rejects_extra_echo() {
        let (engine, _) = engine(2);
        engine.create_echo("shrine_ping", json!({})).await.unwrap();
        engine.create_echo("shrine_ping", json!({})).await.unwrap();

        let err = engine.create_echo("shrine_ping", json!({})).await.unwrap_err();
        assert!(err.is_backpressure());
        assert_eq!(engine.len().await, 2);
    }

    #[tokio::test]
    async fn test_decay_midpoint() {
        let (engine, _) = engine(10);
        let pattern = EchoPattern::new(FrequencyClass::Medium, 0.7, Duration::from_millis(5000));
        let echo = engine
            .create_echo_with_pattern("badge_awarded", pattern, json!({}))
            .await
            .unwrap();

        engine
            .decay_at(echo.created_at + chrono::Duration::milliseconds(2500))
            .await;
        let decayed = engine.get(echo.id).await.unwrap();
        assert!((decayed.amplitude - 0.35).abs() < 1e-9);
        assert!(decayed.resonating);
    }

    #[tokio::test]
    async fn test_sweep_removes_after_decay_duration() {
        let (engine, _) = engine(10);
        let echo = engine.create_echo("shrine_ping", json!({})).await.unwrap();

        let report = engine
            .tick_at(echo.created_at + chrono::Duration::milliseconds(3000))
            .await;
        assert_eq!(report.silenced, 1);
        assert_eq!(report.removed, 1);
        assert!(engine.is_empty().await);
    }

    #[tokio::test]
    async fn test_amplify_caps_and_publishes() {
        let (engine, bus) = engine(10);
        let mut rx = bus.stream();
        let echo = engine.create_echo("convergence", json!({})).await.unwrap();

        let amplified = engine.amplify(echo.id, 5.0).await.unwrap();
        assert!((amplified.amplitude - 2.0).abs() < f64::EPSILON);

        assert_eq!(rx.recv().await.unwrap().topic(), topics::ECHO_CREATED);
        assert_eq!(rx.recv().await.unwrap().topic(), topics::ECHO_AMPLIFIED);
    }

    #[tokio::test]
    async fn test_amplify_unknown_echo() {
        let (engine, _) = engine(10);
        let id = Uuid::new_v4();
        assert!(matches!(
            engine.amplify(id, 1.3).await,
            Err(OrchestrationError::UnknownEcho(missing)) if missing == id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_harmonics_follow_after_delay() {
        let (engine, bus) = engine(10);
        let mut rx = bus.stream();
        engine.create_echo("relic_misfire", json!({})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().topic(), topics::ECHO_CREATED);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());

        let mut harmonics = Vec::new();
        for _ in 0..2 {
            match rx.recv().await.unwrap().payload {
                EventPayload::EchoHarmonic { harmonic_kind, .. } => harmonics.push(harmonic_kind),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        assert_eq!(harmonics, vec!["shrine_alert", "codex_entry"]);
    }
}
