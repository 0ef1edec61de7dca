//! EventBus service for topic-based publish/subscribe.
//!
//! `publish` delivers to every subscriber of the event's topic, in
//! subscription order, before returning. A failing or panicking subscriber
//! is logged and skipped; the publisher never sees its error. Every event is
//! also stamped with an id and a monotonically increasing sequence number
//! and broadcast on a tap channel for passive observers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::models::{BusConfig, ConvergenceState, Echo, Ritual, RitualOutcome};

/// Topic names carried on the bus.
pub mod topics {
    /// A relic misfired
    pub const RELIC_TRIGGERED: &str = "relic:triggered";
    /// A badge was awarded to a member
    pub const BADGE_AWARDED: &str = "badge:awarded";
    /// A shrine health check finished
    pub const SHRINE_PING: &str = "shrine:ping";
    /// The community season changed
    pub const SEASON_CHANGED: &str = "season:changed";
    /// A ritual was admitted and dispatched
    pub const RITUAL_STARTED: &str = "ritual:started";
    /// A ritual reached `completed`
    pub const RITUAL_COMPLETED: &str = "ritual:completed";
    /// Summary published at the end of every control cycle
    pub const ORCHESTRATION_CYCLE: &str = "orchestration:cycle";
    /// The convergence state machine changed state
    pub const CONVERGENCE_CHANGED: &str = "convergence:changed";
    /// An echo started resonating
    pub const ECHO_CREATED: &str = "echo:created";
    /// An echo was amplified
    pub const ECHO_AMPLIFIED: &str = "echo:amplified";
    /// A delayed harmonic of an echo
    pub const ECHO_HARMONIC: &str = "echo:harmonic";
    /// Subscribing to this topic receives every event.
    pub const ALL: &str = "*";
}

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence number before the first event
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event payloads. The topic is derived from the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    // Inbound domain events from adapters
    /// Inbound: a relic misfired
    RelicTriggered {
        /// Relic that misfired
        relic_kind: String,
        /// Misfire count reported by the relic
        severity: u32,
        /// When the misfire happened
        timestamp: DateTime<Utc>,
    },
    /// Inbound: a badge was awarded
    BadgeAwarded {
        /// Badge title
        badge_name: String,
        /// Member who earned it
        recipient: String,
        /// Arbitrary badge details
        metadata: serde_json::Value,
    },
    /// Inbound: a shrine health check finished
    ShrinePing {
        /// Whether the shrine answered
        success: bool,
        /// Reported severity of the outcome
        severity: u32,
        /// When the check ran
        timestamp: DateTime<Utc>,
    },
    /// Inbound: the community season changed
    SeasonChanged {
        /// Season being left
        previous: String,
        /// Season now in effect
        current: String,
    },

    // Ritual lifecycle
    /// A ritual was admitted, with its fanned-out participants
    RitualStarted(Ritual),
    /// A ritual finished
    RitualCompleted {
        /// The ritual as it completed
        ritual: Ritual,
        /// How it finished
        outcome: RitualOutcome,
    },

    // Cycle and convergence
    /// End-of-cycle summary
    OrchestrationCycle {
        /// Mean alignment this cycle
        alignment: f64,
        /// Convergence state after evaluation
        state: ConvergenceState,
        /// Active components at evaluation time
        active_component_count: usize,
        /// Rituals still waiting for a slot
        queue_depth: usize,
    },
    /// The controller changed state
    ConvergenceChanged {
        /// Previous state
        from: ConvergenceState,
        /// New state
        to: ConvergenceState,
        /// Alignment that triggered the change
        alignment: f64,
    },

    // Echoes
    /// An echo was created
    EchoCreated(Echo),
    /// An echo was amplified
    EchoAmplified(Echo),
    /// A harmonic followed an echo
    EchoHarmonic {
        /// Echo the harmonic belongs to
        echo_id: Uuid,
        /// Kind of that echo
        source_kind: String,
        /// Kind of the harmonic itself
        harmonic_kind: String,
    },

    /// Anything else, on an arbitrary topic.
    Custom {
        /// Topic the event is delivered on
        topic: String,
        /// Free-form body
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// Topic this payload is delivered on.
    pub fn topic(&self) -> &str {
        match self {
            Self::RelicTriggered { .. } => topics::RELIC_TRIGGERED,
            Self::BadgeAwarded { .. } => topics::BADGE_AWARDED,
            Self::ShrinePing { .. } => topics::SHRINE_PING,
            Self::SeasonChanged { .. } => topics::SEASON_CHANGED,
            Self::RitualStarted(_) => topics::RITUAL_STARTED,
            Self::RitualCompleted { .. } => topics::RITUAL_COMPLETED,
            Self::OrchestrationCycle { .. } => topics::ORCHESTRATION_CYCLE,
            Self::ConvergenceChanged { .. } => topics::CONVERGENCE_CHANGED,
            Self::EchoCreated(_) => topics::ECHO_CREATED,
            Self::EchoAmplified(_) => topics::ECHO_AMPLIFIED,
            Self::EchoHarmonic { .. } => topics::ECHO_HARMONIC,
            Self::Custom { topic, .. } => topic.as_str(),
        }
    }
}

/// Event envelope as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique event id
    pub id: EventId,
    /// Position in the bus-wide publish order
    pub sequence: SequenceNumber,
    /// When the bus stamped the event
    pub timestamp: DateTime<Utc>,
    /// Typed body; determines the topic
    pub payload: EventPayload,
}

impl BusEvent {
    /// Topic derived from the payload
    pub fn topic(&self) -> &str {
        self.payload.topic()
    }
}

/// A subscriber attached to one topic for the life of the bus.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in fault logs.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the bus and go no further.
    async fn handle(&self, event: &BusEvent) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into a subscriber.
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync,
{
    /// Named subscriber calling `f` for every event
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &BusEvent) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

struct Subscription {
    topic: String,
    subscriber: Arc<dyn EventSubscriber>,
}

impl Subscription {
    fn matches(&self, topic: &str) -> bool {
        self.topic == topics::ALL || self.topic == topic
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast tap.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl From<&BusConfig> for EventBusConfig {
    fn from(config: &BusConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Central publish/subscribe bus, injected into the orchestrator.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    sender: broadcast::Sender<BusEvent>,
    sequence: AtomicU64,
    subscriber_faults: AtomicU64,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            subscriptions: RwLock::new(Vec::new()),
            sender,
            sequence: AtomicU64::new(0),
            subscriber_faults: AtomicU64::new(0),
        }
    }

    /// Register a subscriber for a topic (or [`topics::ALL`]).
    pub async fn subscribe(&self, topic: impl Into<String>, subscriber: Arc<dyn EventSubscriber>) {
        let topic = topic.into();
        tracing::debug!(topic = %topic, subscriber = subscriber.name(), "subscriber attached");
        self.subscriptions.write().await.push(Subscription { topic, subscriber });
    }

    /// Register a closure subscriber.
    pub async fn subscribe_fn<F>(&self, topic: impl Into<String>, name: impl Into<String>, f: F)
    where
        F: Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(topic, Arc::new(FnSubscriber::new(name, f))).await;
    }

    /// Publish a payload and deliver it to every current subscriber of its
    /// topic. Returns the stamped event.
    pub async fn publish(&self, payload: EventPayload) -> BusEvent {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = BusEvent {
            id: EventId::new(),
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            payload,
        };

        // Snapshot so subscribers may publish or subscribe re-entrantly.
        let targets: Vec<Arc<dyn EventSubscriber>> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|s| s.matches(event.topic()))
                .map(|s| s.subscriber.clone())
                .collect()
        };

        for subscriber in targets {
            let outcome = AssertUnwindSafe(subscriber.handle(&event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.subscriber_faults.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        topic = %event.topic(),
                        subscriber = subscriber.name(),
                        sequence = seq,
                        error = %e,
                        "subscriber failed"
                    );
                }
                Err(_) => {
                    self.subscriber_faults.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        topic = %event.topic(),
                        subscriber = subscriber.name(),
                        sequence = seq,
                        "subscriber panicked"
                    );
                }
            }
        }

        // Tap for observers (ignore send errors - may have no receivers)
        let _ = self.sender.send(event.clone());
        event
    }

    /// Passive stream of every published event.
    pub fn stream(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the next sequence number to be assigned.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Number of subscriber invocations that failed or panicked.
    pub fn subscriber_faults(&self) -> u64 {
        self.subscriber_faults.load(Ordering::Relaxed)
    }

    /// Number of subscribers attached to a topic, counting wildcards.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.matches(topic))
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
