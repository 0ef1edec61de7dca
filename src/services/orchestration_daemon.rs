//! Background driver for the orchestrator.
//!
//! Runs two periodic loops on one task: the control cycle and the echo
//! decay/cleanup tick. Both fire once immediately on start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::models::Config;
use crate::services::orchestrator::Orchestrator;

/// Configuration for the orchestration daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between control cycles
    pub cycle_interval: Duration,
    /// Time between echo decay ticks
    pub echo_tick_interval: Duration,
    /// Stop after this many cycles. Runs until stopped when `None`.
    pub max_cycles: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5),
            echo_tick_interval: Duration::from_secs(1),
            max_cycles: None,
        }
    }
}

impl From<&Config> for DaemonConfig {
    fn from(config: &Config) -> Self {
        Self {
            cycle_interval: config.cycle.interval(),
            echo_tick_interval: config.echoes.tick_interval(),
            max_cycles: None,
        }
    }
}

impl DaemonConfig {
    /// Set or clear the cycle limit
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}

/// Reason the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Requested to stop.
    Requested,
    /// Ran the configured number of cycles.
    CycleLimitReached,
}

/// Status of the daemon.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonStatus {
    /// Whether the loop is still running
    pub running: bool,
    /// Control cycles completed
    pub cycles_run: u64,
    /// Echo ticks completed
    pub echo_ticks: u64,
    /// When the last cycle finished
    pub last_cycle: Option<DateTime<Utc>>,
    /// Why the loop exited, once it has
    pub stop_reason: Option<StopReason>,
}

/// Handle to control a running daemon.
pub struct OrchestratorHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
    done: watch::Receiver<Option<StopReason>>,
    task: JoinHandle<StopReason>,
}

impl OrchestratorHandle {
    /// Request the daemon to stop. Takes effect before the next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether [`Self::stop`] was called
    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Copy of the daemon's status
    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    /// Resolve once the daemon loop has exited. Can be awaited repeatedly.
    pub async fn wait(&self) -> StopReason {
        let mut done = self.done.clone();
        loop {
            if let Some(reason) = *done.borrow_and_update() {
                return reason;
            }
            if done.changed().await.is_err() {
                // Loop task ended without reporting
                return self
                    .status
                    .read()
                    .await
                    .stop_reason
                    .unwrap_or(StopReason::Requested);
            }
        }
    }

    /// Wait for the daemon task to exit and reclaim it.
    pub async fn join(self) -> anyhow::Result<StopReason> {
        Ok(self.task.await?)
    }
}

/// Runs control cycles and echo ticks on their own intervals.
pub struct OrchestrationDaemon {
    orchestrator: Arc<Orchestrator>,
    config: DaemonConfig,
}

impl OrchestrationDaemon {
    /// Daemon driving `orchestrator` with `config`
    pub fn new(orchestrator: Arc<Orchestrator>, config: DaemonConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Spawn the daemon loop.
    pub fn start(self) -> OrchestratorHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let status = Arc::new(RwLock::new(DaemonStatus::default()));
        let (done_tx, done) = watch::channel(None);

        let task = tokio::spawn(self.run_loop(
            stop_flag.clone(),
            wake.clone(),
            status.clone(),
            done_tx,
        ));

        OrchestratorHandle {
            stop_flag,
            wake,
            status,
            done,
            task,
        }
    }

    async fn run_loop(
        self,
        stop_flag: Arc<AtomicBool>,
        wake: Arc<Notify>,
        status: Arc<RwLock<DaemonStatus>>,
        done: watch::Sender<Option<StopReason>>,
    ) -> StopReason {
        status.write().await.running = true;
        tracing::info!(
            cycle_ms = self.config.cycle_interval.as_millis() as u64,
            echo_tick_ms = self.config.echo_tick_interval.as_millis() as u64,
            max_cycles = ?self.config.max_cycles,
            "orchestration daemon started"
        );

        let mut cycle_timer = interval(self.config.cycle_interval);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut echo_timer = interval(self.config.echo_tick_interval);
        echo_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            if stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }

            tokio::select! {
                () = wake.notified() => {}
                _ = cycle_timer.tick() => {
                    let report = self.orchestrator.run_cycle().await;
                    let cycles_run = {
                        let mut status = status.write().await;
                        status.cycles_run += 1;
                        status.last_cycle = Some(Utc::now());
                        status.cycles_run
                    };
                    tracing::debug!(cycle = report.cycle, "daemon cycle complete");

                    if self.config.max_cycles.is_some_and(|max| cycles_run >= max) {
                        break StopReason::CycleLimitReached;
                    }
                }
                _ = echo_timer.tick() => {
                    let report = self.orchestrator.tick_echoes().await;
                    status.write().await.echo_ticks += 1;
                    if report.removed > 0 || report.silenced > 0 {
                        tracing::debug!(
                            silenced = report.silenced,
                            removed = report.removed,
                            remaining = report.remaining,
                            "echo tick"
                        );
                    }
                }
            }
        };

        {
            let mut status = status.write().await;
            status.running = false;
            status.stop_reason = Some(reason);
        }
        tracing::info!(reason = ?reason, "orchestration daemon stopped");
        let _ = done.send(Some(reason));
        reason
    }
}
