//! The orchestrator owns the registry, ritual manager, echo engine and
//! alignment controller, and drives them one cycle at a time.
//!
//! The event bus is injected so adapters and observers can share it.
//! Construction wires the built-in ritual handlers and the inbound event
//! reactions onto the bus.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::OrchestrationResult;
use crate::domain::models::{Component, Config, ConvergenceState};
use crate::domain::ports::{Chronicler, Herald, InMemoryChronicler, TracingHerald};
use crate::services::alignment_controller::{AlignmentController, AlignmentEvaluation};
use crate::services::component_registry::ComponentRegistry;
use crate::services::echo_engine::{EchoEngine, EchoTickReport};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::metrics::{MetricsSnapshot, OrchestrationMetrics};
use crate::services::reactions::DomainReactions;
use crate::services::ritual_handlers::register_builtin_handlers;
use crate::services::ritual_manager::RitualManager;

/// What one control cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    /// Components whose heartbeat was refreshed
    pub heartbeats: usize,
    /// Rituals admitted by this cycle's drain
    pub admitted: Vec<Uuid>,
    /// Alignment evaluation after the drain
    pub evaluation: AlignmentEvaluation,
    /// Rituals still waiting for a slot
    pub queue_depth: usize,
    /// Rituals executing or active
    pub active_rituals: usize,
}

/// Point-in-time view of the whole core.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Convergence state
    pub state: ConvergenceState,
    /// Latest aggregate alignment, if a cycle ran
    pub alignment: Option<f64>,
    /// Retained alignment samples
    pub history_len: usize,
    /// Components registered, inactive ones included
    pub registered_components: usize,
    /// Active components
    pub active_components: usize,
    /// Rituals waiting for a slot
    pub queue_depth: usize,
    /// Rituals executing or active
    pub active_rituals: usize,
    /// Echoes held
    pub echoes: usize,
    /// Counter snapshot
    pub metrics: MetricsSnapshot,
}

/// Owns every orchestration service and runs the control cycle.
pub struct Orchestrator {
    config: Config,
    bus: Arc<EventBus>,
    registry: Arc<ComponentRegistry>,
    rituals: Arc<RitualManager>,
    echoes: Arc<EchoEngine>,
    controller: Arc<AlignmentController>,
    metrics: Arc<OrchestrationMetrics>,
}

impl Orchestrator {
    /// Build with an in-memory chronicler and a logging herald.
    pub async fn new(config: Config, bus: Arc<EventBus>) -> Self {
        Self::with_ports(
            config,
            bus,
            Arc::new(InMemoryChronicler::new()),
            Arc::new(TracingHerald::new()),
        )
        .await
    }

    /// Build with the given collaborators, wiring reactions and built-in handlers onto `bus`.
    pub async fn with_ports(
        config: Config,
        bus: Arc<EventBus>,
        chronicler: Arc<dyn Chronicler>,
        herald: Arc<dyn Herald>,
    ) -> Self {
        let metrics = Arc::new(OrchestrationMetrics::new());
        let registry = Arc::new(ComponentRegistry::new());
        let rituals = Arc::new(RitualManager::new(
            config.rituals.clone(),
            registry.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let echoes = Arc::new(EchoEngine::new(
            config.echoes.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let controller = Arc::new(AlignmentController::new(
            &config.cycle,
            registry.clone(),
            rituals.clone(),
            chronicler.clone(),
            bus.clone(),
            metrics.clone(),
        ));

        register_builtin_handlers(&rituals, chronicler, herald, echoes.clone()).await;
        Arc::new(DomainReactions::new(echoes.clone(), rituals.clone()))
            .attach(&bus)
            .await;

        Self {
            config,
            bus,
            registry,
            rituals,
            echoes,
            controller,
            metrics,
        }
    }

    /// Register every component listed in the configuration.
    pub async fn register_configured_components(&self) -> OrchestrationResult<usize> {
        for component in &self.config.components {
            self.registry
                .register(
                    component.name.clone(),
                    component.kind.clone(),
                    component.initial_alignment,
                )
                .await?;
        }
        Ok(self.config.components.len())
    }

    /// Register one component
    pub async fn register_component(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        initial_alignment: f64,
    ) -> OrchestrationResult<Component> {
        self.registry.register(name, kind, initial_alignment).await
    }

    /// Run one control cycle: refresh heartbeats, drain the ritual queue,
    /// recompute alignment and check convergence, then publish
    /// `orchestration:cycle`. Never waits on a ritual handler.
    pub async fn run_cycle(&self) -> CycleReport {
        let heartbeats = self.registry.refresh_heartbeats().await;
        let admitted = self.rituals.drain().await;
        let evaluation = self.controller.evaluate().await;
        let queue_depth = self.rituals.queue_depth().await;
        let active_rituals = self.rituals.active_count().await;

        self.bus
            .publish(EventPayload::OrchestrationCycle {
                alignment: evaluation.alignment,
                state: evaluation.state,
                active_component_count: evaluation.active_component_count,
                queue_depth,
            })
            .await;

        self.metrics.record_cycle();
        let cycle = self.metrics.snapshot().cycles;
        tracing::debug!(
            cycle,
            alignment = evaluation.alignment,
            state = %evaluation.state,
            admitted = admitted.len(),
            queue_depth,
            active_rituals,
            "orchestration cycle"
        );

        CycleReport {
            cycle,
            heartbeats,
            admitted,
            evaluation,
            queue_depth,
            active_rituals,
        }
    }

    /// One echo decay pass and cleanup sweep.
    pub async fn tick_echoes(&self) -> EchoTickReport {
        self.echoes.tick().await
    }

    /// Point-in-time view of every service
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            state: self.controller.state().await,
            alignment: self.controller.latest().await.map(|s| s.alignment),
            history_len: self.controller.history_len().await,
            registered_components: self.registry.len().await,
            active_components: self.registry.list_active().await.len(),
            queue_depth: self.rituals.queue_depth().await,
            active_rituals: self.rituals.active_count().await,
            echoes: self.echoes.len().await,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Component registry
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Ritual lifecycle manager
    pub fn rituals(&self) -> &Arc<RitualManager> {
        &self.rituals
    }

    /// Echo resonance engine
    pub fn echoes(&self) -> &Arc<EchoEngine> {
        &self.echoes
    }

    /// Alignment and convergence controller
    pub fn controller(&self) -> &Arc<AlignmentController> {
        &self.controller
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
