use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A documentation entry handed to the chronicler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronicleEntry {
    /// Short subject line, e.g. `convergence` or `relic_misfire`
    pub subject: String,
    /// Free-form structured body
    pub body: serde_json::Value,
    /// Alignment the entry manifests, within `[0, 1]`
    pub alignment: f64,
    /// When the entry was created
    pub recorded_at: DateTime<Utc>,
}

impl ChronicleEntry {
    /// Entry with its alignment clamped to `[0, 1]`
    pub fn new(subject: impl Into<String>, body: serde_json::Value, alignment: f64) -> Self {
        Self {
            subject: subject.into(),
            body,
            alignment: crate::domain::models::clamp_alignment(alignment),
            recorded_at: Utc::now(),
        }
    }
}

/// Port for the documentation / audit-trail collaborator
///
/// Ritual handlers record convergence events and codex updates here. The
/// chronicler also reports the average alignment its entries manifest; the
/// alignment controller feeds that value back into the documentation
/// component's own score.
#[async_trait]
pub trait Chronicler: Send + Sync {
    /// Record an entry
    async fn record(&self, entry: ChronicleEntry) -> Result<()>;

    /// Average alignment manifested by recorded entries, if any exist
    fn manifested_alignment(&self) -> Option<f64>;
}

/// Default number of entries [`InMemoryChronicler`] retains.
pub const DEFAULT_CHRONICLE_CAPACITY: usize = 1000;

#[derive(Debug)]
struct ChronicleLog {
    entries: VecDeque<ChronicleEntry>,
    capacity: usize,
    alignment_sum: f64,
    recorded: u64,
}

/// Keeps the most recent entries in memory. Used when no external
/// documentation store is wired in, and in tests.
///
/// Evicted entries still count toward [`Chronicler::manifested_alignment`],
/// which is kept as a running total over everything ever recorded.
#[derive(Debug)]
pub struct InMemoryChronicler {
    log: Mutex<ChronicleLog>,
}

impl InMemoryChronicler {
    /// Chronicler retaining [`DEFAULT_CHRONICLE_CAPACITY`] entries
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHRONICLE_CAPACITY)
    }

    /// Chronicler retaining at most `capacity` entries (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: Mutex::new(ChronicleLog {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CHRONICLE_CAPACITY)),
                capacity,
                alignment_sum: 0.0,
                recorded: 0,
            }),
        }
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> Vec<ChronicleEntry> {
        self.log
            .lock()
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.entries.len()).unwrap_or(0)
    }

    /// Whether no entries are retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries recorded over the chronicler's lifetime, evicted ones included
    pub fn recorded(&self) -> u64 {
        self.log.lock().map(|log| log.recorded).unwrap_or(0)
    }
}

impl Default for InMemoryChronicler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Chronicler for InMemoryChronicler {
    async fn record(&self, entry: ChronicleEntry) -> Result<()> {
        tracing::debug!(subject = %entry.subject, alignment = entry.alignment, "chronicle entry recorded");
        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow::anyhow!("chronicle store poisoned"))?;
        log.alignment_sum += entry.alignment;
        log.recorded += 1;
        if log.entries.len() == log.capacity {
            log.entries.pop_front();
        }
        log.entries.push_back(entry);
        Ok(())
    }

    fn manifested_alignment(&self) -> Option<f64> {
        let log = self.log.lock().ok()?;
        if log.recorded == 0 {
            return None;
        }
        Some(log.alignment_sum / log.recorded as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_manifested_alignment_averages_entries() {
        let chronicler = InMemoryChronicler::new();
        assert!(chronicler.manifested_alignment().is_none());

        chronicler
            .record(ChronicleEntry::new("a", json!({}), 0.6))
            .await
            .unwrap();
        chronicler
            .record(ChronicleEntry::new("b", json!({}), 1.0))
            .await
            .unwrap();

        assert_eq!(chronicler.len(), 2);
        assert!((chronicler.manifested_alignment().unwrap() - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_eviction_keeps_lifetime_average() {
        let chronicler = InMemoryChronicler::with_capacity(3);
        for alignment in [0.2, 0.4, 0.6, 0.8, 1.0] {
            chronicler
                .record(ChronicleEntry::new("codex", json!({}), alignment))
                .await
                .unwrap();
        }

        assert_eq!(chronicler.len(), 3);
        assert_eq!(chronicler.recorded(), 5);
        let retained: Vec<f64> = chronicler.entries().iter().map(|e| e.alignment).collect();
        assert_eq!(retained, vec![0.6, 0.8, 1.0]);
        assert!((chronicler.manifested_alignment().unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_entry_alignment_clamped() {
        let entry = ChronicleEntry::new("x", json!(null), 4.0);
        assert!((entry.alignment - 1.0).abs() < f64::EPSILON);
    }
}
