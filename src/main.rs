pub mod config;
pub mod sink;

use {
    config::SinkerConfig,
    sink::{
        ring, AggregationEvent, AggregationSinker, ChannelStagingDispatcher,
        SqliteAggregateStore,
    },
    std::sync::Arc,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("🚀 Starting Aggflow sink runtime...");

    let config = SinkerConfig::from_env();
    config.validate()?;

    log::info!("📊 Configuration:");
    log::info!("   ├─ Database: {}", config.db_path);
    log::info!("   ├─ Ring capacity: {} slots", config.ring_capacity);
    log::info!("   ├─ Staging buffer: {}", config.staging_buffer);
    log::info!("   └─ Resync wait timeout: {}ms", config.resync_wait_timeout_ms);

    // Open the store (creates schema on first run)
    let store = Arc::new(SqliteAggregateStore::new(&config.db_path)?);
    log::info!("✅ Aggregate store ready");

    // Downstream staging consumer: logs staged key sets as they arrive.
    // Dependent services subscribe here for cache invalidation.
    let (staging, mut staging_rx) = ChannelStagingDispatcher::new(config.staging_buffer);
    tokio::spawn(async move {
        while let Some(staged) = staging_rx.recv().await {
            log::info!(
                "🔑 {} aggregate keys staged for downstream refresh",
                staged.keys().len()
            );
            log::debug!(
                "staged keys: {}",
                serde_json::to_string(staged.keys()).unwrap_or_default()
            );
        }
    });

    // Build the ordered ring and spawn the single consumer
    let (publisher, consumer) = ring::bounded::<AggregationEvent>(config.ring_capacity)?;
    let sinker = AggregationSinker::new(store, Arc::new(staging));
    let drain = tokio::spawn(async move {
        sinker.run(consumer).await;
    });

    log::info!("✅ Aggregation pipeline running (single consumer)");
    log::info!("🔄 Waiting for upstream producers; press CTRL+C to shutdown");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            log::info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            log::error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    // Closing the last publisher lets the sinker drain and stop
    drop(publisher);
    let _ = drain.await;

    log::info!("✅ Aggflow sink runtime stopped");
    Ok(())
}
