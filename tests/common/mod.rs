//! Common test utilities for integration tests
//!
//! Shared fixtures for building an orchestrator with recording ports and
//! for capturing bus traffic.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use kypria::domain::models::{Config, Ritual, RitualOutcome, RitualTimeouts};
use kypria::domain::ports::{InMemoryChronicler, RecordingHerald};
use kypria::services::{BusEvent, EventBus, EventPayload, EventSubscriber, Orchestrator};

/// Defaults with short ritual deadlines.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rituals.timeouts = RitualTimeouts::uniform(1_000);
    config
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<EventBus>,
    pub chronicler: Arc<InMemoryChronicler>,
    pub herald: Arc<RecordingHerald>,
}

pub async fn harness(config: Config) -> Harness {
    let bus = Arc::new(EventBus::default());
    let chronicler = Arc::new(InMemoryChronicler::new());
    let herald = Arc::new(RecordingHerald::new());
    let orchestrator = Arc::new(
        Orchestrator::with_ports(config, bus.clone(), chronicler.clone(), herald.clone()).await,
    );
    Harness {
        orchestrator,
        bus,
        chronicler,
        herald,
    }
}

/// Subscriber that keeps every event it sees.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<BusEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.topic().to_string())
            .collect()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.events().iter().filter(|e| e.topic() == topic).count()
    }
}

#[async_trait]
impl EventSubscriber for EventRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &BusEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Next `ritual:completed` event from a bus stream.
pub async fn next_completion(rx: &mut broadcast::Receiver<BusEvent>) -> (Ritual, RitualOutcome) {
    loop {
        let event = rx.recv().await.expect("bus stream closed");
        if let EventPayload::RitualCompleted { ritual, outcome } = event.payload {
            return (ritual, outcome);
        }
    }
}
