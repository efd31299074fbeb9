use anyhow::{Context, Result};
use charge_worker::queue::{self, QueueTransport};
use charge_worker::services::transaction_store::run_schema_setup;
use charge_worker::services::{
    ChargeMetrics, ChargeProcessor, ConsumerSettings, InMemoryTransactionStore, QueueConsumer,
};
use charge_worker::Config;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Consumes charge requests from a queue and processes them", long_about = None)]
struct Cli {
    /// TOML config file; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines file of charge request bodies to enqueue before polling
    #[arg(long)]
    seed: Option<PathBuf>,
}

async fn seed_queue(transport: &dyn QueueTransport, path: &Path) -> Result<usize> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading seed file {}", path.display()))?;

    let mut count = 0;
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        transport
            .send(line.to_string(), HashMap::new())
            .await
            .context("enqueueing seed message")?;
        count += 1;
    }
    Ok(count)
}

/// Resolves on SIGINT (ctrl-c) or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT").map_err(Into::into),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env().context("reading configuration from environment")?,
    };
    config.validate().context("invalid configuration")?;
    info!(queue_url = %config.queue_url, database = ?config.database, "Starting charge worker");

    let transport = queue::open_transport(&config.queue_url, config.visibility_timeout())
        .context("opening charge queue")?;
    let dead_letter = config
        .dead_letter_queue_url
        .as_deref()
        .map(|url| queue::open_transport(url, config.visibility_timeout()))
        .transpose()
        .context("opening dead-letter queue")?;

    let store = Arc::new(InMemoryTransactionStore::new());
    run_schema_setup(store.as_ref(), config.run_schema_setup)
        .await
        .context("schema setup")?;

    if let Some(path) = &cli.seed {
        let count = seed_queue(transport.as_ref(), path).await?;
        info!(count, "Seeded charge queue");
    }

    let metrics = Arc::new(ChargeMetrics::new());
    let processor = Arc::new(ChargeProcessor::new(config.accepted_card_networks.clone()));

    let mut consumer = QueueConsumer::new(
        transport,
        processor,
        store.clone(),
        metrics.clone(),
        ConsumerSettings::from(&config),
    );
    if let Some(dead_letter) = dead_letter {
        consumer = consumer.with_dead_letter_queue(dead_letter);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker = tokio::spawn(async move { consumer.run(shutdown_rx).await });

    tokio::select! {
        signal = shutdown_signal() => {
            let name = signal.context("listening for shutdown signal")?;
            info!(signal = name, "Shutdown requested, draining in-flight batch");
            if shutdown_tx.send(true).is_err() {
                warn!("Consumer already stopped");
            }
            worker.await.context("consumer task panicked")?;
        }
        result = &mut worker => {
            result.context("consumer task panicked")?;
            anyhow::bail!("consumer stopped without a shutdown request");
        }
    }

    info!(
        metrics = %metrics.snapshot(),
        stored_transactions = store.len(),
        "Charge worker stopped"
    );
    Ok(())
}
