//! Alignment and convergence controller.
//!
//! Each evaluation averages the alignment of active components, records the
//! sample, and walks the `idle -> converged <-> realigning` state machine.
//! Transitions are edge-triggered: a compensating ritual is enqueued only on
//! the evaluation that changes state.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{
    mean_alignment, AlignmentHistory, AlignmentSample, ConvergenceState, CycleConfig, Ritual,
    RitualKind, RitualPriority,
};
use crate::domain::ports::Chronicler;
use crate::services::component_registry::ComponentRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::metrics::OrchestrationMetrics;
use crate::services::ritual_manager::RitualManager;

/// Outcome of one alignment evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentEvaluation {
    /// Mean alignment of the active components
    pub alignment: f64,
    /// Active components the mean covered
    pub active_component_count: usize,
    /// State after this evaluation
    pub state: ConvergenceState,
    /// `(from, to)` when this evaluation changed state
    pub transition: Option<(ConvergenceState, ConvergenceState)>,
    /// Compensating ritual enqueued by the transition
    pub ritual_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct ControllerState {
    state: ConvergenceState,
    history: AlignmentHistory,
}

/// Watches aggregate alignment and reacts to threshold crossings
pub struct AlignmentController {
    inner: Mutex<ControllerState>,
    threshold: f64,
    registry: Arc<ComponentRegistry>,
    rituals: Arc<RitualManager>,
    chronicler: Arc<dyn Chronicler>,
    bus: Arc<EventBus>,
    metrics: Arc<OrchestrationMetrics>,
}

impl AlignmentController {
    /// Controller starting in [`ConvergenceState::Idle`] with an empty history
    pub fn new(
        config: &CycleConfig,
        registry: Arc<ComponentRegistry>,
        rituals: Arc<RitualManager>,
        chronicler: Arc<dyn Chronicler>,
        bus: Arc<EventBus>,
        metrics: Arc<OrchestrationMetrics>,
    ) -> Self {
        Self {
            inner: Mutex::new(ControllerState {
                state: ConvergenceState::Idle,
                history: AlignmentHistory::new(config.history_capacity),
            }),
            threshold: config.convergence_threshold,
            registry,
            rituals,
            chronicler,
            bus,
            metrics,
        }
    }

    /// Alignment at or above which the system counts as converged
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Recompute alignment and act on any convergence edge.
    pub async fn evaluate(&self) -> AlignmentEvaluation {
        // Only documentation components pick up what the chronicler
        // manifests; every other component keeps its own value.
        if let Some(manifested) = self.chronicler.manifested_alignment() {
            self.registry.set_documentation_alignment(manifested).await;
        }

        let mut active_names: Vec<String> = Vec::new();
        let alignment = {
            let active = self.registry.list_active().await;
            active_names.extend(active.iter().map(|c| c.name.clone()));
            mean_alignment(active.iter().map(|c| c.alignment))
        };
        active_names.sort();

        let (state, transition) = {
            let mut inner = self.inner.lock().await;
            inner.history.push(AlignmentSample {
                alignment,
                timestamp: Utc::now(),
            });
            let from = inner.state;
            let transition = from
                .transition_for(alignment, self.threshold)
                .map(|to| (from, to));
            if let Some((_, to)) = transition {
                inner.state = to;
            }
            (inner.state, transition)
        };

        let mut ritual_id = None;
        if let Some((from, to)) = transition {
            self.metrics.record_convergence_transition();
            tracing::info!(
                from = %from,
                to = %to,
                alignment,
                threshold = self.threshold,
                "convergence state changed"
            );
            self.bus
                .publish(EventPayload::ConvergenceChanged { from, to, alignment })
                .await;
            ritual_id = Some(self.compensate(to, alignment, &active_names).await);
        }

        AlignmentEvaluation {
            alignment,
            active_component_count: active_names.len(),
            state,
            transition,
            ritual_id,
        }
    }

    async fn compensate(&self, to: ConvergenceState, alignment: f64, active: &[String]) -> Uuid {
        let ritual = match to {
            ConvergenceState::Converged => Ritual::new(
                RitualKind::Convergence,
                json!({ "alignment": alignment, "threshold": self.threshold }),
            ),
            ConvergenceState::Realigning | ConvergenceState::Idle => Ritual::new(
                RitualKind::AlignmentConvergence,
                json!({ "goal": self.threshold, "alignment": alignment }),
            ),
        }
        .with_participants(active.iter().cloned());
        self.rituals
            .enqueue(ritual.with_priority(RitualPriority::High))
            .await
    }

    /// Current convergence state
    pub async fn state(&self) -> ConvergenceState {
        self.inner.lock().await.state
    }

    /// Most recent sample, if any cycle ran
    pub async fn latest(&self) -> Option<AlignmentSample> {
        self.inner.lock().await.history.latest().copied()
    }

    /// Retained samples, oldest first
    pub async fn history(&self) -> Vec<AlignmentSample> {
        self.inner.lock().await.history.iter().copied().collect()
    }

    /// Number of retained samples
    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RitualConfig, DOCUMENTATION_KIND};
    use crate::domain::ports::{ChronicleEntry, InMemoryChronicler};

    struct Fixture {
        controller: AlignmentController,
        registry: Arc<ComponentRegistry>,
        rituals: Arc<RitualManager>,
        chronicler: Arc<InMemoryChronicler>,
    }

    fn fixture(threshold: f64) -> Fixture {
        let registry = Arc::new(ComponentRegistry::new());
        let bus = Arc::new(EventBus::default());
        let metrics = Arc::new(OrchestrationMetrics::new());
        let rituals = Arc::new(RitualManager::new(
            RitualConfig::default(),
            registry.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let chronicler = Arc::new(InMemoryChronicler::new());
        let config = CycleConfig {
            convergence_threshold: threshold,
            ..CycleConfig::default()
        };
        let controller = AlignmentController::new(
            &config,
            registry.clone(),
            rituals.clone(),
            chronicler.clone(),
            bus,
            metrics,
        );
        Fixture {
            controller,
            registry,
            rituals,
            chronicler,
        }
    }

    #[tokio::test]
    async fn test_empty_registry_scores_zero() {
        let f = fixture(0.85);
        let eval = f.controller.evaluate().await;
        assert_eq!(eval.alignment, 0.0);
        assert_eq!(eval.state, ConvergenceState::Idle);
        assert!(eval.transition.is_none());
        assert_eq!(f.controller.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_edges_fire_once() {
        let f = fixture(0.85);
        f.registry.register("codex", "scribe", 0.9).await.unwrap();

        let first = f.controller.evaluate().await;
        assert_eq!(
            first.transition,
            Some((ConvergenceState::Idle, ConvergenceState::Converged))
        );
        let second = f.controller.evaluate().await;
        assert!(second.transition.is_none());

        f.registry.set_alignment("codex", 0.8).await.unwrap();
        let third = f.controller.evaluate().await;
        assert_eq!(third.state, ConvergenceState::Realigning);

        let queued = f.rituals.queued().await;
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].kind, RitualKind::Convergence);
        assert_eq!(queued[1].kind, RitualKind::AlignmentConvergence);
        assert!((queued[1].payload["goal"].as_f64().unwrap() - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_chronicler_only_feeds_documentation_component() {
        let f = fixture(0.85);
        f.registry.register("scribe", DOCUMENTATION_KIND, 0.0).await.unwrap();
        f.registry.register("warden", "guard", 0.5).await.unwrap();
        f.chronicler
            .record(ChronicleEntry::new("codex_update", serde_json::json!({}), 1.0))
            .await
            .unwrap();

        let eval = f.controller.evaluate().await;
        assert!((eval.alignment - 0.75).abs() < 1e-9);
        assert!((f.registry.get("warden").await.unwrap().alignment - 0.5).abs() < 1e-9);
    }
}
