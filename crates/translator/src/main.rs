//! Main entry point for the pulse build translator.

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use config::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use nats_client::NatsClient;
use normalizer::{
    BuildbotAdapter, BusPublisher, DisplayPublisher, Dispatcher, HttpProbe, MessageAdapter,
    Publish, TranslatorService,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Timeout for a single log availability request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the service may take to stop after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    logging::init(&args.logdir)?;

    info!("Starting pulse build translator...");

    if let Some(metrics_port) = args.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], metrics_port))
            .install()?;

        info!(
            "Prometheus metrics available at http://0.0.0.0:{}/metrics",
            metrics_port
        );
    }

    if let Some(path) = &args.message {
        return translate_file(&args, path).await;
    }

    let nats_client = Arc::new(NatsClient::connect_with(&args.connection_config()).await?);
    let dispatcher = dispatcher(&args, Some(nats_client.clone()))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let service = TranslatorService::new(dispatcher, nats_client, args.durable, shutdown_rx);

    // Spawn translator task
    let service_handle = tokio::spawn(async move {
        if let Err(e) = service.run().await {
            error!("Translator failed: {:?}", e);
        }
    });

    info!("Translator service spawned");

    shutdown_signal().await?;

    info!("Shutting down translator...");
    let _ = shutdown_tx.send(()).await;

    let abort_handle = service_handle.abort_handle();
    if tokio::time::timeout(SHUTDOWN_GRACE, service_handle).await.is_err() {
        warn!("Translator did not stop within {:?}, aborting", SHUTDOWN_GRACE);
        abort_handle.abort();
    }

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;

        tokio::select! {
            res = signal::ctrl_c() => {
                res.context("failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C");
            }
            _ = terminate.recv() => info!("Received terminate signal"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

/// Wire the dispatcher to the bus, or to stdout when `--display-only` is set.
fn dispatcher(args: &Args, nats_client: Option<Arc<NatsClient>>) -> Result<Dispatcher<BuildbotAdapter>> {
    let publisher: Arc<dyn Publish> = match nats_client {
        Some(client) if !args.display_only => Arc::new(BusPublisher::new(client)),
        _ => Arc::new(DisplayPublisher::new()),
    };
    let probe = Arc::new(HttpProbe::new(PROBE_TIMEOUT)?);

    Ok(Dispatcher::new(
        BuildbotAdapter::new(),
        BuildbotAdapter::default_config(),
        publisher,
        probe,
    ))
}

/// Translate one message read from a file, waiting for its log poll if any.
async fn translate_file(args: &Args, path: &Path) -> Result<()> {
    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read message file {}", path.display()))?;

    let nats_client = if args.display_only {
        None
    } else {
        Some(Arc::new(NatsClient::connect_with(&args.connection_config()).await?))
    };

    let mut dispatcher = dispatcher(args, nats_client)?;
    dispatcher.handle("", &payload).await;
    dispatcher.drain().await;

    info!("Finished translating {}", path.display());
    Ok(())
}
