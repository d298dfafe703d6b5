//! The `ifstat <INTERFACE>` run: configure, attach, print counters, detach.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use ifstat_core::config::IfstatConfig;
use ifstat_ebpf_engine::{
    AttachFlags, AttachmentManager, HookPlatform, SessionReport, XdpPlatform, session,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, OutputFormat};
use crate::error::CliError;
use crate::output::{OutputWriter, SnapshotReport};
use crate::{logging, metrics_server};

/// Load configuration with precedence file < env < command line, then validate.
pub async fn load_config(cli: &Cli) -> Result<IfstatConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => IfstatConfig::load(path).await?,
        None => IfstatConfig::from_env()?,
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Execute the command until SIGINT/SIGTERM.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli).await?;

    logging::init_tracing(&config.general)?;
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    info!(
        interface = %cli.interface,
        program = %config.xdp.program_path,
        mode = %config.xdp.mode,
        "ifstat starting"
    );

    let platform = Arc::new(XdpPlatform::new(&config.xdp.program_path));
    let report = monitor_interface(
        platform,
        &cli.interface,
        &config,
        cli.output,
        cancel,
        &mut std::io::stdout(),
    )
    .await?;

    info!(
        interface = %report.interface,
        snapshots = report.snapshots,
        "detached cleanly"
    );
    Ok(())
}

/// Attach to `interface` on `platform`, write one report per interval to `out`
/// until `cancel` fires, then detach.
pub async fn monitor_interface(
    platform: Arc<dyn HookPlatform>,
    interface: &str,
    config: &IfstatConfig,
    format: OutputFormat,
    cancel: CancellationToken,
    out: &mut dyn Write,
) -> Result<SessionReport, CliError> {
    let manager = AttachmentManager::new(platform);
    let writer = OutputWriter::new(format);

    let report = session::run(
        &manager,
        interface,
        config.effective_filters(),
        AttachFlags::new(config.xdp.mode),
        Duration::from_millis(config.monitor.interval_ms),
        cancel,
        |rules, snapshot| {
            let payload = SnapshotReport::new(interface, rules, snapshot);
            if let Err(e) = writer.render(&mut *out, &payload) {
                warn!(error = %e, "failed to write counters");
            }
        },
    )
    .await?;

    Ok(report)
}

/// Cancel `cancel` on the first SIGTERM or SIGINT.
///
/// Handlers are installed before returning so a signal that arrives during
/// attach is not lost.
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<(), CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "shutdown signal received");
        cancel.cancel();
    });
    Ok(())
}
