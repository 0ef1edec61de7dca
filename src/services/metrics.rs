//! In-process orchestration counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::models::RitualOutcome;

/// Counters shared by the orchestration services.
#[derive(Debug, Default)]
pub struct OrchestrationMetrics {
    cycles: AtomicU64,
    rituals_enqueued: AtomicU64,
    rituals_admitted: AtomicU64,
    rituals_fulfilled: AtomicU64,
    rituals_timed_out: AtomicU64,
    rituals_faulted: AtomicU64,
    echoes_created: AtomicU64,
    echoes_rejected: AtomicU64,
    echoes_amplified: AtomicU64,
    echoes_silenced: AtomicU64,
    echoes_expired: AtomicU64,
    harmonics_emitted: AtomicU64,
    convergence_transitions: AtomicU64,
}

impl OrchestrationMetrics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one control cycle
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one ritual entering the queue
    pub fn record_ritual_enqueued(&self) {
        self.rituals_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one ritual admitted to a slot
    pub fn record_ritual_admitted(&self) {
        self.rituals_admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one completed ritual under its outcome
    pub fn record_ritual_outcome(&self, outcome: &RitualOutcome) {
        let counter = match outcome {
            RitualOutcome::Fulfilled => &self.rituals_fulfilled,
            RitualOutcome::TimedOut => &self.rituals_timed_out,
            RitualOutcome::Faulted { .. } => &self.rituals_faulted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one created echo
    pub fn record_echo_created(&self) {
        self.echoes_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one echo rejected at capacity
    pub fn record_echo_rejected(&self) {
        self.echoes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one amplification
    pub fn record_echo_amplified(&self) {
        self.echoes_amplified.fetch_add(1, Ordering::Relaxed);
    }

    /// Count echoes that stopped resonating
    pub fn record_echoes_silenced(&self, count: u64) {
        self.echoes_silenced.fetch_add(count, Ordering::Relaxed);
    }

    /// Count echoes removed by the sweep
    pub fn record_echoes_expired(&self, count: u64) {
        self.echoes_expired.fetch_add(count, Ordering::Relaxed);
    }

    /// Count one emitted harmonic
    pub fn record_harmonic(&self) {
        self.harmonics_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one convergence state change
    pub fn record_convergence_transition(&self) {
        self.convergence_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            rituals_enqueued: self.rituals_enqueued.load(Ordering::Relaxed),
            rituals_admitted: self.rituals_admitted.load(Ordering::Relaxed),
            rituals_fulfilled: self.rituals_fulfilled.load(Ordering::Relaxed),
            rituals_timed_out: self.rituals_timed_out.load(Ordering::Relaxed),
            rituals_faulted: self.rituals_faulted.load(Ordering::Relaxed),
            echoes_created: self.echoes_created.load(Ordering::Relaxed),
            echoes_rejected: self.echoes_rejected.load(Ordering::Relaxed),
            echoes_amplified: self.echoes_amplified.load(Ordering::Relaxed),
            echoes_silenced: self.echoes_silenced.load(Ordering::Relaxed),
            echoes_expired: self.echoes_expired.load(Ordering::Relaxed),
            harmonics_emitted: self.harmonics_emitted.load(Ordering::Relaxed),
            convergence_transitions: self.convergence_transitions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`OrchestrationMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Control cycles run
    pub cycles: u64,
    /// Rituals that entered the queue
    pub rituals_enqueued: u64,
    /// Rituals admitted to a slot
    pub rituals_admitted: u64,
    /// Rituals completed by their handler
    pub rituals_fulfilled: u64,
    /// Rituals completed by deadline
    pub rituals_timed_out: u64,
    /// Rituals whose handler failed or panicked
    pub rituals_faulted: u64,
    /// Echoes created
    pub echoes_created: u64,
    /// Echoes rejected at capacity
    pub echoes_rejected: u64,
    /// Amplifications applied
    pub echoes_amplified: u64,
    /// Echoes that stopped resonating
    pub echoes_silenced: u64,
    /// Echoes removed by the sweep
    pub echoes_expired: u64,
    /// Harmonic notifications published
    pub harmonics_emitted: u64,
    /// Convergence state changes
    pub convergence_transitions: u64,
}

impl MetricsSnapshot {
    /// Rituals that reached `completed`, whatever the outcome.
    pub fn rituals_completed(&self) -> u64 {
        self.rituals_fulfilled + self.rituals_timed_out + self.rituals_faulted
    }
}
