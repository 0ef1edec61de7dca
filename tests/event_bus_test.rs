//! Bus delivery guarantees and the domain reactions wired onto it.

mod common;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;

use kypria::domain::models::{RitualKind, RitualOutcome, RitualPriority};
use kypria::services::{topics, EventBus, EventPayload};

use common::{harness, next_completion, test_config, EventRecorder};

fn season(current: &str) -> EventPayload {
    EventPayload::SeasonChanged {
        previous: "spring".to_string(),
        current: current.to_string(),
    }
}

#[tokio::test]
async fn test_each_subscriber_sees_publish_order() {
    let bus = EventBus::default();
    let first = EventRecorder::new();
    let second = EventRecorder::new();
    bus.subscribe(topics::SEASON_CHANGED, first.clone()).await;
    bus.subscribe(topics::ALL, second.clone()).await;

    for current in ["summer", "autumn", "winter"] {
        bus.publish(season(current)).await;
    }

    for recorder in [&first, &second] {
        let seen: Vec<String> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::SeasonChanged { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(seen, vec!["summer", "autumn", "winter"]);
    }
}

#[tokio::test]
async fn test_faulty_subscribers_are_isolated() {
    let bus = EventBus::default();
    let delivered = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe_fn(topics::SEASON_CHANGED, "erroring", |_| {
        anyhow::bail!("cannot read the stars")
    })
    .await;
    bus.subscribe_fn(topics::SEASON_CHANGED, "panicking", |_| panic!("eclipse"))
        .await;
    let sink = delivered.clone();
    bus.subscribe_fn(topics::SEASON_CHANGED, "steady", move |event| {
        sink.lock().unwrap().push(event.sequence.0);
        Ok(())
    })
    .await;

    let first = bus.publish(season("summer")).await;
    let second = bus.publish(season("autumn")).await;

    assert_eq!(
        *delivered.lock().unwrap(),
        vec![first.sequence.0, second.sequence.0]
    );
    assert_eq!(bus.subscriber_faults(), 4);
}

#[tokio::test]
async fn test_unsubscribed_topic_is_dropped() {
    let bus = EventBus::default();
    let event = bus.publish(season("summer")).await;
    assert_eq!(event.topic(), topics::SEASON_CHANGED);

    let late = EventRecorder::new();
    bus.subscribe(topics::SEASON_CHANGED, late.clone()).await;
    assert!(late.events().is_empty());
}

#[tokio::test]
async fn test_severe_relic_echoes_and_documents() {
    let h = harness(test_config()).await;
    let mut rx = h.bus.stream();

    h.bus
        .publish(EventPayload::RelicTriggered {
            relic_kind: "lantern".to_string(),
            severity: 5,
            timestamp: Utc::now(),
        })
        .await;

    let echoes = h.orchestrator.echoes().snapshot().await;
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0].kind, "relic_misfire");
    assert!((echoes[0].amplitude - 0.9 * 1.5).abs() < 1e-9);

    let (ritual, outcome) = next_completion(&mut rx).await;
    assert_eq!(ritual.kind, RitualKind::CodexUpdate);
    assert_eq!(ritual.priority, RitualPriority::High);
    assert_eq!(outcome, RitualOutcome::Fulfilled);

    let entries = h.chronicler.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].subject, "relic_misfire");
    assert!((entries[0].alignment - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_mild_relic_is_normal_priority_and_unamplified() {
    let h = harness(test_config()).await;
    let mut rx = h.bus.stream();

    h.bus
        .publish(EventPayload::RelicTriggered {
            relic_kind: "lantern".to_string(),
            severity: 1,
            timestamp: Utc::now(),
        })
        .await;

    let echoes = h.orchestrator.echoes().snapshot().await;
    assert!((echoes[0].amplitude - 0.9).abs() < 1e-9);
    let (ritual, _) = next_completion(&mut rx).await;
    assert_eq!(ritual.priority, RitualPriority::Normal);
}

#[tokio::test]
async fn test_badge_synchronizes_active_components() {
    let h = harness(test_config()).await;
    let mut rx = h.bus.stream();
    for name in ["warden", "codex"] {
        h.orchestrator.register_component(name, "bot", 0.5).await.unwrap();
    }

    h.bus
        .publish(EventPayload::BadgeAwarded {
            badge_name: "Lantern Keeper".to_string(),
            recipient: "ione".to_string(),
            metadata: json!({ "tier": 2 }),
        })
        .await;

    let (ritual, outcome) = next_completion(&mut rx).await;
    assert_eq!(ritual.kind, RitualKind::Synchronization);
    assert_eq!(ritual.participants, vec!["codex", "warden"]);
    assert_eq!(outcome, RitualOutcome::Fulfilled);

    let recipients: Vec<String> = h.herald.sent().into_iter().map(|a| a.recipient).collect();
    assert_eq!(recipients, vec!["codex", "warden"]);
    assert_eq!(h.orchestrator.echoes().snapshot().await[0].kind, "badge_awarded");
}

#[tokio::test]
async fn test_failed_shrine_ping_is_amplified() {
    let h = harness(test_config()).await;

    h.bus
        .publish(EventPayload::ShrinePing {
            success: false,
            severity: 0,
            timestamp: Utc::now(),
        })
        .await;
    h.bus
        .publish(EventPayload::ShrinePing {
            success: true,
            severity: 0,
            timestamp: Utc::now(),
        })
        .await;

    let mut amplitudes: Vec<f64> = h
        .orchestrator
        .echoes()
        .snapshot()
        .await
        .into_iter()
        .map(|e| e.amplitude)
        .collect();
    amplitudes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((amplitudes[0] - 0.5).abs() < 1e-9);
    assert!((amplitudes[1] - 0.65).abs() < 1e-9);
    assert_eq!(h.orchestrator.rituals().queue_depth().await, 0);
}

#[tokio::test]
async fn test_season_change_starts_high_priority_sync() {
    let h = harness(test_config()).await;
    let recorder = EventRecorder::new();
    h.bus.subscribe(topics::RITUAL_STARTED, recorder.clone()).await;

    h.bus.publish(season("winter")).await;

    let started = recorder.events();
    assert_eq!(started.len(), 1);
    match &started[0].payload {
        EventPayload::RitualStarted(ritual) => {
            assert_eq!(ritual.kind, RitualKind::Synchronization);
            assert_eq!(ritual.priority, RitualPriority::High);
            assert_eq!(ritual.payload["reason"], json!("season_shift"));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}
