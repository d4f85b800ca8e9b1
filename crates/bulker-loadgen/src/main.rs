#![doc = include_str!("../README.md")]

mod config;
mod driver;
mod store;
mod telemetry;

use bulker::{Accumulator, CancellationToken};
use clap::Parser;
use config::{CliArgs, LoadConfig};
use driver::{LoadReport, run_load};
use std::sync::Arc;
use store::InventoryStore;
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoadConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let store = Arc::new(InventoryStore::new(config.store.clone()));
    let accumulator = Accumulator::new(Arc::clone(&store), config.accumulator)?;
    let stop = CancellationToken::new();

    let mut load = tokio::spawn({
        let accumulator = accumulator.clone();
        let config = config.clone();
        let stop = stop.clone();
        async move { run_load(accumulator, &config, stop).await }
    });

    let finished = tokio::select! {
        report = &mut load => Some(report?),
        () = shutdown_signal() => None,
    };
    let report = match finished {
        Some(report) => report,
        None => {
            tracing::info!("Shutdown signal received, cancelling outstanding requests...");
            // Clients stop waiting as soon as the token fires, so this
            // returns promptly with the partial report.
            stop.cancel();
            load.await?
        }
    };

    accumulator.shutdown().await;
    log_summary(&config, &report, &accumulator, store.calls());

    providers.shutdown();
    Ok(())
}

fn log_startup_info(config: &LoadConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting load run with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting load run: {} clients x {} requests, max batch size {}, window {:?}",
            config.num_clients,
            config.requests_per_client,
            config.accumulator.max_batch_size,
            config.accumulator.window,
        );
    }
}

fn log_summary(
    config: &LoadConfig,
    report: &LoadReport,
    accumulator: &Accumulator<Arc<InventoryStore>>,
    handler_calls: u64,
) {
    let stats = accumulator.stats();
    tracing::info!(
        planned = config.total_requests(),
        settled = report.total(),
        ok = report.ok,
        failed = report.failed,
        cancelled = report.cancelled,
        timed_out = report.timed_out,
        shutdown = report.shutdown,
        elapsed_ms = report.elapsed.as_millis() as u64,
        requests_per_sec = report.throughput() as u64,
        "Load run finished"
    );
    tracing::info!(
        handler_calls,
        batches = stats.batches,
        mean_batch_size = stats.mean_batch_size(),
        batch_failures = stats.batch_failures,
        singleton_failures = stats.singleton_failures,
        rejected_on_shutdown = stats.rejected_on_shutdown,
        "Accumulator stats"
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
