//! Echo domain model.
//!
//! Echoes are transient signals created in response to bus events. Their
//! amplitude decays linearly over the pattern's decay duration; the engine
//! removes them once they expire or fall below the removal floor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard ceiling for any echo amplitude.
pub const MAX_AMPLITUDE: f64 = 2.0;

/// At or below this amplitude an echo stops resonating.
pub const SILENCE_THRESHOLD: f64 = 0.1;

/// At or below this amplitude an echo is swept from the set.
pub const REMOVAL_FLOOR: f64 = 0.05;

/// Frequency class of an echo pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyClass {
    /// Slow background signals
    Low,
    /// Ordinary signals
    Medium,
    /// Urgent signals
    High,
    /// System-wide signals
    Resonant,
}

/// Shape of an echo: how loud it starts, how long it lasts, and which
/// harmonics follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoPattern {
    /// Frequency class
    pub frequency: FrequencyClass,
    /// Amplitude at creation and the origin of linear decay
    pub base_amplitude: f64,
    /// Time from creation to expiry
    #[serde(with = "duration_millis")]
    pub decay_duration: Duration,
    /// Kinds announced after the harmonic delay
    pub harmonics: Vec<String>,
}

impl EchoPattern {
    /// Pattern without harmonics
    pub fn new(frequency: FrequencyClass, base_amplitude: f64, decay_duration: Duration) -> Self {
        Self {
            frequency,
            base_amplitude,
            decay_duration,
            harmonics: Vec::new(),
        }
    }

    /// Replace the harmonic kinds
    pub fn with_harmonics<I, S>(mut self, harmonics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.harmonics = harmonics.into_iter().map(Into::into).collect();
        self
    }

    /// Built-in pattern for an echo kind. Unknown kinds get a quiet
    /// medium-frequency pattern with no harmonics.
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "relic_misfire" => Self::new(FrequencyClass::High, 0.9, Duration::from_secs(8))
                .with_harmonics(["shrine_alert", "codex_entry"]),
            "badge_awarded" => Self::new(FrequencyClass::Medium, 0.7, Duration::from_secs(5))
                .with_harmonics(["celebration"]),
            "shrine_ping" => Self::new(FrequencyClass::Low, 0.5, Duration::from_secs(3)),
            "season_shift" => Self::new(FrequencyClass::Resonant, 0.8, Duration::from_secs(10))
                .with_harmonics(["season_blessing"]),
            "convergence" => Self::new(FrequencyClass::Resonant, 1.0, Duration::from_secs(12))
                .with_harmonics(["harmony"]),
            _ => Self::new(FrequencyClass::Medium, 0.5, Duration::from_secs(5)),
        }
    }
}

/// A transient decaying signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    /// Unique echo id
    pub id: Uuid,
    /// Echo kind, which selected the pattern
    pub kind: String,
    /// Shape of the echo
    pub pattern: EchoPattern,
    /// Data from the event that caused it
    pub data: serde_json::Value,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creation time plus the decay duration
    pub expires_at: DateTime<Utc>,
    /// Current amplitude, within `[0, 2]`
    pub amplitude: f64,
    /// False once the amplitude fell to the silence threshold
    pub resonating: bool,
}

impl Echo {
    /// Resonating echo at the pattern's base amplitude
    pub fn new(
        kind: impl Into<String>,
        pattern: EchoPattern,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = now + to_chrono(pattern.decay_duration);
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            amplitude: pattern.base_amplitude.clamp(0.0, MAX_AMPLITUDE),
            pattern,
            data,
            created_at: now,
            expires_at,
            resonating: true,
        }
    }

    /// Amplitude this echo should have at `now` given linear decay from the
    /// pattern's base. Amplification does not carry into this value.
    pub fn amplitude_at(&self, now: DateTime<Utc>) -> f64 {
        let decay_ms = self.pattern.decay_duration.as_millis() as f64;
        if decay_ms <= 0.0 {
            return 0.0;
        }
        let age_ms = (now - self.created_at).num_milliseconds().max(0) as f64;
        let remaining = (1.0 - age_ms / decay_ms).max(0.0);
        (self.pattern.base_amplitude * remaining).clamp(0.0, MAX_AMPLITUDE)
    }

    /// Recompute amplitude for `now`. Returns true when this call silenced
    /// the echo.
    pub fn decay(&mut self, now: DateTime<Utc>) -> bool {
        if !self.resonating {
            return false;
        }
        self.amplitude = self.amplitude_at(now);
        if self.amplitude <= SILENCE_THRESHOLD {
            self.resonating = false;
            return true;
        }
        false
    }

    /// Multiply the current amplitude, capped at [`MAX_AMPLITUDE`]. The boost
    /// holds until the next decay tick recomputes from the base amplitude.
    pub fn amplify(&mut self, multiplier: f64) {
        self.amplitude = (self.amplitude * multiplier.max(0.0)).min(MAX_AMPLITUDE);
    }

    /// Whether the cleanup sweep should drop this echo.
    pub fn is_spent(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at || self.amplitude <= REMOVAL_FLOOR
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
