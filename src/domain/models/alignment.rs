//! Alignment samples, rolling history and the convergence state machine.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of samples kept in the rolling history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Convergence state of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceState {
    /// No cycle has crossed the threshold yet
    #[default]
    Idle,
    /// Alignment is at or above the threshold
    Converged,
    /// Alignment fell below the threshold after converging
    Realigning,
}

impl ConvergenceState {
    /// Lowercase name used in logs and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Converged => "converged",
            Self::Realigning => "realigning",
        }
    }

    /// State the controller moves to for an observed alignment, or `None`
    /// when no edge fires.
    pub fn transition_for(&self, alignment: f64, threshold: f64) -> Option<Self> {
        let above = alignment >= threshold;
        match (self, above) {
            (Self::Idle | Self::Realigning, true) => Some(Self::Converged),
            (Self::Converged, false) => Some(Self::Realigning),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped aggregate alignment value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSample {
    /// Mean alignment of the active components
    pub alignment: f64,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

/// Capped rolling history of samples; oldest evicted first.
#[derive(Debug, Clone)]
pub struct AlignmentHistory {
    samples: VecDeque<AlignmentSample>,
    capacity: usize,
}

impl AlignmentHistory {
    /// History keeping at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: AlignmentSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&AlignmentSample> {
        self.samples.back()
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &AlignmentSample> {
        self.samples.iter()
    }
}

impl Default for AlignmentHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Mean of the given alignments, or 0 when there are none.
///
/// A plain left-to-right float sum. Components sitting exactly on the
/// threshold can average one ulp below it (seven at 0.85 give
/// 0.8499999999999999), in which case no convergence edge fires.
pub fn mean_alignment<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
