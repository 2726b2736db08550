use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry_producer::config::{ProducerConfig, CONFIG_PATH_ENV};
use telemetry_producer::nats::{NatsClient, NatsTransport};
use telemetry_producer::{DrainOutcome, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_producer=info".into()),
        )
        .init();

    info!("Telemetry producer starting...");

    let scheduler = match startup().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Startup failed");
            return ExitCode::from(1);
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let summary = scheduler.run(shutdown).await;

    if summary.drain == DrainOutcome::TimedOut {
        warn!("Drain timed out, in-flight readings were abandoned");
    }
    info!("Telemetry producer stopped");

    ExitCode::SUCCESS
}

async fn startup() -> Result<Scheduler<NatsTransport>> {
    let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = ProducerConfig::load(path.as_deref()).context("Invalid configuration")?;

    info!(
        address = ?config.broker.address,
        topic = %config.broker.topic,
        entities = ?config.entities,
        interval_ms = config.tick_interval_ms,
        "Configuration loaded"
    );

    let nats = NatsClient::connect(config.broker.clone()).await?;
    let transport = NatsTransport::new(&nats);

    Ok(Scheduler::from_config(&config, transport)?)
}

/// Cancel the scheduler on ctrl-c or SIGTERM
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, listening for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
