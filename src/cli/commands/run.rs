//! Implementation of the `kypria run` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::{
    DaemonConfig, EventBus, OrchestrationDaemon, Orchestrator, OrchestratorStatus, StopReason,
};

/// Arguments for `kypria run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to .kypria/config.yaml merged with local.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stop after this many control cycles instead of waiting for Ctrl-C
    #[arg(long)]
    pub cycles: Option<u64>,
}

/// Summary printed when the daemon stops
#[derive(Debug, Serialize)]
pub struct RunOutput {
    /// Components registered from configuration
    pub registered_components: usize,
    /// Why the daemon stopped
    pub stop_reason: StopReason,
    /// Final orchestrator status
    pub status: OrchestratorStatus,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let m = &self.status.metrics;
        let alignment = self
            .status
            .alignment
            .map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}"));
        [
            format!("Stopped: {:?}", self.stop_reason),
            format!(
                "Components: {} registered, {} active",
                self.status.registered_components, self.status.active_components
            ),
            format!("Cycles: {}", m.cycles),
            format!("Alignment: {alignment} ({})", self.status.state),
            format!(
                "Rituals: {} admitted, {} fulfilled, {} timed out, {} faulted, {} queued",
                m.rituals_admitted,
                m.rituals_fulfilled,
                m.rituals_timed_out,
                m.rituals_faulted,
                self.status.queue_depth
            ),
            format!(
                "Echoes: {} created, {} rejected, {} resonating",
                m.echoes_created, m.echoes_rejected, self.status.echoes
            ),
        ]
        .join("\n")
    }
}

/// Run the daemon until Ctrl-C or the cycle limit
pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)?;

    let bus = Arc::new(EventBus::new((&config.bus).into()));
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), bus).await);
    let registered_components = orchestrator
        .register_configured_components()
        .await
        .context("Failed to register configured components")?;

    let daemon_config = DaemonConfig::from(&config).with_max_cycles(args.cycles);
    let handle = OrchestrationDaemon::new(orchestrator.clone(), daemon_config).start();

    tokio::select! {
        _ = handle.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("interrupt received, stopping");
            handle.stop();
        }
    }
    let stop_reason = handle.join().await?;

    let result = RunOutput {
        registered_components,
        stop_reason,
        status: orchestrator.status().await,
    };
    output(&result, json_mode);
    Ok(())
}
