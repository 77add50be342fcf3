use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use bridge_runtime::{init_tracing, load_config, run_command_driver, Cli, TelemetryConfig};
use editor_bridge::EditorBridge;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli, |key| std::env::var(key).ok())?;

    init_tracing(&TelemetryConfig::from_env(&config.logging))?;
    config.report_ignored();

    let bridge = EditorBridge::new(config.bridge).context("failed to create editor bridge")?;
    let addr = bridge
        .start()
        .await
        .context("failed to start editor bridge")?;
    info!(addr = %addr, version = editor_bridge::VERSION, "Waiting for editor on ws://{}/", addr);

    let _events = bridge.subscribe_events(|event| {
        info!(event_type = %event.kind, "Editor event");
        Ok(())
    });

    if cli.stdin {
        let mut driver = tokio::spawn(run_command_driver(
            bridge.gateway(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        ));
        tokio::select! {
            signal = shutdown_signal() => signal?,
            finished = &mut driver => match finished {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %format!("{:#}", e), "Command driver failed"),
                Err(e) => error!(error = %e, "Command driver panicked"),
            },
        }
    } else {
        shutdown_signal().await?;
    }

    // Graceful shutdown
    bridge.stop().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            ctrl_c = tokio::signal::ctrl_c() => ctrl_c.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Shutdown signal received");
    Ok(())
}
