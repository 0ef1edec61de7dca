//! Ritual lifecycle manager.
//!
//! Rituals wait in a two-class priority queue and are admitted while fewer
//! than `max_concurrent` rituals hold a slot. Admission fans the ritual out
//! to every active component, then hands it to the handler for its kind on
//! a spawned task. A supervisor races three completion signals:
//!
//! 1. the handler's [`RitualCompletion`] handle,
//! 2. the handler task finishing (error or panic counts as a fault),
//! 3. the per-kind deadline.
//!
//! Whichever fires first completes the ritual and frees the slot. The
//! handler task is not aborted on timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinError;
use uuid::Uuid;

use crate::domain::errors::OrchestrationError;
use crate::domain::models::{
    Ritual, RitualConfig, RitualOutcome, RitualQueue, RitualStatus, RitualTimeouts,
};
use crate::services::component_registry::ComponentRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::metrics::OrchestrationMetrics;

/// Signals that a ritual has finished its work.
///
/// Clones share one signal. Only the first `complete` call across all
/// clones has any effect.
#[derive(Debug, Clone)]
pub struct RitualCompletion {
    sender: Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>,
}

impl RitualCompletion {
    fn new(sender: oneshot::Sender<()>) -> Self {
        Self {
            sender: Arc::new(std::sync::Mutex::new(Some(sender))),
        }
    }

    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    /// Mark the ritual complete. Returns false if it was already signalled
    /// or the ritual has already completed another way.
    pub fn complete(&self) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        sender.map(|tx| tx.send(()).is_ok()).unwrap_or(false)
    }
}

/// Kind-specific ritual behaviour.
///
/// Handlers run detached from the control cycle and may outlive their
/// deadline, so they must tolerate running after the ritual completed.
#[async_trait]
pub trait RitualHandler: Send + Sync {
    /// Perform the ritual. Returning `Ok` without calling
    /// [`RitualCompletion::complete`] also counts as fulfilled.
    async fn perform(&self, ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()>;
}

/// Used for kinds with no registered handler.
#[derive(Debug, Default)]
pub struct NoopRitualHandler;

#[async_trait]
impl RitualHandler for NoopRitualHandler {
    async fn perform(&self, _ritual: Ritual, completion: RitualCompletion) -> anyhow::Result<()> {
        completion.complete();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RitualState {
    queue: RitualQueue<Ritual>,
    active: HashMap<Uuid, Ritual>,
}

/// Admits queued rituals under a concurrency ceiling and supervises their completion.
pub struct RitualManager {
    state: Arc<Mutex<RitualState>>,
    handlers: RwLock<HashMap<String, Arc<dyn RitualHandler>>>,
    fallback: Arc<dyn RitualHandler>,
    registry: Arc<ComponentRegistry>,
    bus: Arc<EventBus>,
    metrics: Arc<OrchestrationMetrics>,
    max_concurrent: usize,
    timeouts: RitualTimeouts,
}

impl RitualManager {
    /// Manager with no handlers registered beyond the no-op fallback
    pub fn new(
        config: RitualConfig,
        registry: Arc<ComponentRegistry>,
        bus: Arc<EventBus>,
        metrics: Arc<OrchestrationMetrics>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(RitualState::default())),
            handlers: RwLock::new(HashMap::new()),
            fallback: Arc::new(NoopRitualHandler),
            registry,
            bus,
            metrics,
            max_concurrent: config.max_concurrent.max(1),
            timeouts: config.timeouts,
        }
    }

    /// Ceiling on rituals executing or active at once
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Register the handler for a ritual kind, replacing any previous one.
    pub async fn register_handler(&self, kind: impl Into<String>, handler: Arc<dyn RitualHandler>) {
        let kind = kind.into();
        tracing::debug!(kind = %kind, "ritual handler registered");
        self.handlers.write().await.insert(kind, handler);
    }

    /// Queue a ritual. High priority goes ahead of every normal ritual and
    /// behind earlier high ones.
    pub async fn enqueue(&self, ritual: Ritual) -> Uuid {
        let id = ritual.id;
        tracing::debug!(
            ritual_id = %id,
            kind = %ritual.kind,
            priority = ?ritual.priority,
            "ritual queued"
        );
        let priority = ritual.priority;
        self.state.lock().await.queue.enqueue(ritual, priority);
        self.metrics.record_ritual_enqueued();
        id
    }

    /// Admit queued rituals while slots are free. Returns the ids admitted,
    /// in admission order.
    pub async fn drain(&self) -> Vec<Uuid> {
        let mut admitted = Vec::new();

        loop {
            // Reserve the slot under the lock so concurrent drains respect
            // the ceiling.
            let mut ritual = {
                let mut state = self.state.lock().await;
                if state.active.len() >= self.max_concurrent {
                    break;
                }
                let Some(mut ritual) = state.queue.dequeue() else {
                    break;
                };
                if let Err(e) = ritual.transition_to(RitualStatus::Executing) {
                    tracing::warn!(ritual_id = %ritual.id, error = %e, "dropping ritual with invalid status");
                    continue;
                }
                state.active.insert(ritual.id, ritual.clone());
                ritual
            };

            let mut names: Vec<String> = self
                .registry
                .list_active()
                .await
                .into_iter()
                .map(|c| c.name)
                .collect();
            names.sort();
            for name in names {
                ritual.add_participant(name);
            }
            if let Err(e) = ritual.transition_to(RitualStatus::Active) {
                tracing::warn!(ritual_id = %ritual.id, error = %e, "ritual status out of step");
            }

            {
                let mut state = self.state.lock().await;
                if let Some(slot) = state.active.get_mut(&ritual.id) {
                    *slot = ritual.clone();
                }
            }

            self.metrics.record_ritual_admitted();
            tracing::info!(
                ritual_id = %ritual.id,
                kind = %ritual.kind,
                participants = ritual.participants.len(),
                "ritual started"
            );
            self.bus.publish(EventPayload::RitualStarted(ritual.clone())).await;

            admitted.push(ritual.id);
            self.dispatch(ritual).await;
        }

        admitted
    }

    async fn dispatch(&self, ritual: Ritual) {
        let handler = match self.handlers.read().await.get(ritual.kind.as_str()) {
            Some(handler) => handler.clone(),
            None => {
                tracing::warn!(ritual_id = %ritual.id, kind = %ritual.kind, "no handler for ritual kind");
                self.fallback.clone()
            }
        };

        let supervisor = Supervisor {
            state: self.state.clone(),
            bus: self.bus.clone(),
            metrics: self.metrics.clone(),
            timeout: self.timeouts.timeout_for(&ritual.kind),
        };
        tokio::spawn(supervisor.run(ritual, handler));
    }

    /// Number of rituals waiting for a slot.
    pub async fn queue_depth(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Queued rituals in admission order.
    pub async fn queued(&self) -> Vec<Ritual> {
        self.state.lock().await.queue.iter().cloned().collect()
    }

    /// Number of rituals holding a slot.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Rituals holding a slot, oldest admission first.
    pub async fn active(&self) -> Vec<Ritual> {
        let mut active: Vec<Ritual> = self.state.lock().await.active.values().cloned().collect();
        active.sort_by_key(|r| r.started_at);
        active
    }
}

/// Owns one admitted ritual until it completes.
struct Supervisor {
    state: Arc<Mutex<RitualState>>,
    bus: Arc<EventBus>,
    metrics: Arc<OrchestrationMetrics>,
    timeout: Duration,
}

impl Supervisor {
    async fn run(self, ritual: Ritual, handler: Arc<dyn RitualHandler>) {
        let id = ritual.id;
        let kind = ritual.kind.to_string();
        let (tx, rx) = oneshot::channel();
        let completion = RitualCompletion::new(tx);

        let work = tokio::spawn({
            let ritual = ritual.clone();
            async move { handler.perform(ritual, completion).await }
        });

        // A dropped completion handle disables the first branch; the task
        // result or the deadline then decides.
        let outcome = tokio::select! {
            biased;
            Ok(()) = rx => RitualOutcome::Fulfilled,
            joined = work => outcome_from_join(joined),
            _ = tokio::time::sleep(self.timeout) => RitualOutcome::TimedOut,
        };

        match &outcome {
            RitualOutcome::Fulfilled => {}
            RitualOutcome::TimedOut => {
                tracing::warn!(
                    ritual_id = %id,
                    kind = %kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ritual timed out"
                );
            }
            RitualOutcome::Faulted { reason } => {
                let fault = OrchestrationError::RitualHandlerFault {
                    ritual_id: id,
                    kind: kind.clone(),
                    reason: reason.clone(),
                };
                tracing::error!(error = %fault, "ritual handler fault");
            }
        }

        self.finish(ritual, outcome).await;
    }

    async fn finish(&self, fallback: Ritual, outcome: RitualOutcome) {
        let mut ritual = self
            .state
            .lock()
            .await
            .active
            .remove(&fallback.id)
            .unwrap_or(fallback);

        if let Err(e) = ritual.transition_to(RitualStatus::Completed) {
            tracing::warn!(ritual_id = %ritual.id, error = %e, "ritual status out of step");
        }
        self.metrics.record_ritual_outcome(&outcome);
        tracing::info!(
            ritual_id = %ritual.id,
            kind = %ritual.kind,
            outcome = ?outcome,
            "ritual completed"
        );
        self.bus
            .publish(EventPayload::RitualCompleted { ritual, outcome })
            .await;
    }
}

fn outcome_from_join(joined: Result<anyhow::Result<()>, JoinError>) -> RitualOutcome {
    match joined {
        Ok(Ok(())) => RitualOutcome::Fulfilled,
        Ok(Err(e)) => RitualOutcome::Faulted {
            reason: format!("{e:#}"),
        },
        Err(e) if e.is_panic() => RitualOutcome::Faulted {
            reason: "handler panicked".to_string(),
        },
        Err(_) => RitualOutcome::Faulted {
            reason: "handler cancelled".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RitualKind, RitualPriority};
    use crate::services::event_bus::topics;
    use serde_json::json;

    struct Stalling;

    #[async_trait]
    impl RitualHandler for Stalling {
        async fn perform(&self, _ritual: Ritual, _completion: RitualCompletion) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl RitualHandler for Failing {
        async fn perform(&self, _ritual: Ritual, _completion: RitualCompletion) -> anyhow::Result<()> {
            anyhow::bail!("relic unreadable")
        }
    }

    fn manager(max_concurrent: usize) -> (RitualManager, Arc<ComponentRegistry>, Arc<EventBus>) {
        let registry = Arc::new(ComponentRegistry::new());
        let bus = Arc::new(EventBus::default());
        let config = RitualConfig {
            max_concurrent,
            timeouts: RitualTimeouts::uniform(1000),
        };
        let manager = RitualManager::new(
            config,
            registry.clone(),
            bus.clone(),
            Arc::new(OrchestrationMetrics::new()),
        );
        (manager, registry, bus)
    }

    async fn next_completion(
        rx: &mut tokio::sync::broadcast::Receiver<crate::services::event_bus::BusEvent>,
    ) -> (Ritual, RitualOutcome) {
        loop {
            let event = rx.recv().await.unwrap();
            if let EventPayload::RitualCompleted { ritual, outcome } = event.payload {
                return (ritual, outcome);
            }
        }
    }

    #[test]
    fn test_completion_only_fires_once() {
        let (tx, mut rx) = oneshot::channel();
        let completion = RitualCompletion::new(tx);
        let clone = completion.clone();
        assert!(completion.complete());
        assert!(!clone.complete());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_holds_and_queue_waits() {
        let (manager, _, _) = manager(2);
        manager.register_handler("vigil", Arc::new(Stalling)).await;

        for _ in 0..4 {
            manager.enqueue(Ritual::new("vigil", json!({}))).await;
        }
        assert_eq!(manager.drain().await.len(), 2);
        assert_eq!(manager.active_count().await, 2);
        assert_eq!(manager.queue_depth().await, 2);
        assert!(manager.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_high_priority_admitted_first() {
        let (manager, _, _) = manager(1);
        manager.register_handler("vigil", Arc::new(Stalling)).await;

        let normal = manager.enqueue(Ritual::new("vigil", json!({}))).await;
        let high = manager
            .enqueue(Ritual::new("vigil", json!({})).with_priority(RitualPriority::High))
            .await;

        assert_eq!(manager.drain().await, vec![high]);
        assert_eq!(manager.queued().await[0].id, normal);
    }

    #[tokio::test]
    async fn test_fan_out_to_active_components() {
        let (manager, registry, _) = manager(5);
        registry.register("warden", "guard", 0.5).await.unwrap();
        registry.register("codex", "scribe", 0.5).await.unwrap();
        manager.register_handler("vigil", Arc::new(Stalling)).await;

        manager
            .enqueue(Ritual::new("vigil", json!({})).with_participants(["warden"]))
            .await;
        manager.drain().await;

        let active = manager.active().await;
        assert_eq!(active[0].participants, vec!["warden", "codex"]);
        assert_eq!(active[0].status, RitualStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_completes_and_frees_slot() {
        let (manager, _, bus) = manager(1);
        let mut rx = bus.stream();
        manager.register_handler("vigil", Arc::new(Stalling)).await;

        manager.enqueue(Ritual::new("vigil", json!({}))).await;
        manager.drain().await;

        let (ritual, outcome) = next_completion(&mut rx).await;
        assert_eq!(outcome, RitualOutcome::TimedOut);
        assert_eq!(ritual.status, RitualStatus::Completed);
        assert!(ritual.completed_at.is_some());
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_handler_error_still_completes() {
        let (manager, _, bus) = manager(1);
        let mut rx = bus.stream();
        manager
            .register_handler(RitualKind::CodexUpdate.as_str(), Arc::new(Failing))
            .await;

        manager
            .enqueue(Ritual::new(RitualKind::CodexUpdate, json!({})))
            .await;
        manager.drain().await;

        let (_, outcome) = next_completion(&mut rx).await;
        assert!(matches!(outcome, RitualOutcome::Faulted { ref reason } if reason.contains("relic unreadable")));
    }

    #[tokio::test]
    async fn test_unknown_kind_uses_noop() {
        let (manager, _, bus) = manager(1);
        let mut rx = bus.stream();

        manager.enqueue(Ritual::new("moon_vigil", json!({}))).await;
        manager.drain().await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), topics::RITUAL_STARTED);
        let (ritual, outcome) = next_completion(&mut rx).await;
        assert_eq!(ritual.kind, RitualKind::Other("moon_vigil".to_string()));
        assert_eq!(outcome, RitualOutcome::Fulfilled);
    }
}
