use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A notification for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Component the announcement is addressed to
    pub recipient: String,
    /// Ritual or echo kind that caused it
    pub topic: String,
    /// Text delivered to the recipient
    pub message: String,
}

/// Port for cross-platform notification delivery
///
/// Delivery to Discord, Patreon, email and the like lives in adapters behind
/// this trait.
#[async_trait]
pub trait Herald: Send + Sync {
    /// Deliver one announcement
    async fn announce(&self, announcement: Announcement) -> Result<()>;
}

/// Logs announcements instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct TracingHerald;

impl TracingHerald {
    /// Logging herald
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Herald for TracingHerald {
    async fn announce(&self, announcement: Announcement) -> Result<()> {
        tracing::info!(
            recipient = %announcement.recipient,
            topic = %announcement.topic,
            message = %announcement.message,
            "announcement"
        );
        Ok(())
    }
}

/// Collects announcements for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingHerald {
    sent: Mutex<Vec<Announcement>>,
}

impl RecordingHerald {
    /// Herald with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Announcements sent so far
    pub fn sent(&self) -> Vec<Announcement> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Herald for RecordingHerald {
    async fn announce(&self, announcement: Announcement) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("herald log poisoned"))?
            .push(announcement);
        Ok(())
    }
}
