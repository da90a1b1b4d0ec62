//! TopVPN - Entry Point
//!
//! Runs the full pipeline: fetch feeds, build the candidate set, probe
//! connectivity, probe HTTP through the engine's slot pool, rank, export.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod engine;
mod error;
mod export;
mod manager;
mod models;
mod parser;
mod pool;
mod probe;
mod ranking;
mod subscription;

use config::Config;
use engine::{EngineApi, EngineProcess};
use manager::ServerManager;
use pool::SlotPool;
use probe::{ConnectionProber, HttpProber};
use subscription::SubscriptionManager;

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "topvpn=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TopVPN prober");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Fetch subscription feeds
    let mut subscriptions = SubscriptionManager::new(Duration::from_secs(config.subscription.timeout));
    subscriptions.add_from_file(&config.subscription.file)?;
    subscriptions.fetch_all().await?;

    // Build the deduplicated candidate set
    let mut manager = ServerManager::new(config.subscription.only_443_port);
    manager.add_from_subscriptions(&subscriptions.subscriptions);
    info!("Built candidate set of {} servers", manager.len());

    // Stage 1: raw TCP reachability
    let conn_prober = ConnectionProber::new(
        Duration::from_secs(config.connection_probe.timeout),
        config.connection_probe.max_concurrent,
    );
    let conn_results = conn_prober.probe(manager.servers()).await;
    manager.apply_connection_results(&conn_results);
    manager.filter_alive_connection();
    info!("{} servers alive by connection", manager.len());

    if manager.is_empty() {
        info!("No reachable servers; nothing to probe over HTTP");
        return Ok(());
    }

    // Start the engine and register the slot skeleton. Failure here is fatal
    // before any candidate is probed.
    let mut engine_process = EngineProcess::new(&config.engine.binary_path);
    engine_process.start()?;
    engine_process.wait_ready(Duration::from_secs(2)).await;

    let engine_api = Arc::new(EngineApi::new(&config.engine.api_url));
    let slot_pool = SlotPool::new(
        engine_api,
        config.engine.pool_size,
        config.engine.base_port,
        Duration::from_millis(config.engine.release_grace_ms),
    );
    slot_pool.setup().await?;

    // Stage 2: HTTP latency through the slot pool, chunk by chunk
    let http_prober = HttpProber::new(
        Duration::from_secs(config.http_probe.timeout),
        config.http_probe.max_concurrent_requests,
    );
    let probe_urls = config.http_probe.probe_urls.clone();

    manager.seed_http_sentinels(&probe_urls);
    let chunk_results = slot_pool
        .run_chunks(manager.servers(), |assignments| {
            let http_prober = &http_prober;
            let probe_urls = &probe_urls;
            async move { Ok(http_prober.check(&assignments, probe_urls).await) }
        })
        .await;

    // Stop the engine before surfacing any probing error.
    engine_process.stop().await;

    for results in chunk_results? {
        manager.apply_http_results(&results);
    }
    manager.filter_alive_http();
    info!("{} servers alive by HTTP", manager.len());

    // Export ranked results
    export::write_subscription(
        manager.fastest_by_http(0).into_iter(),
        &config.export.subscription_file,
    )?;
    export::write_servers_dump(manager.servers(), &config.export.dumps_dir, None)?;

    info!("TopVPN prober finished");
    Ok(())
}
