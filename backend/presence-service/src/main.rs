use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use presence_service::background;
use presence_service::cache::{
    CacheBackend, CacheManager, MemoryBackend, RedisBackend, SafeBackend,
};
use presence_service::config::Config;
use presence_service::db::{PgSessionStore, PgStreamStore, SessionStore, StreamStore};
use presence_service::services::ViewerPresenceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let distributed = config.redis.url.is_some();
    let backend: Arc<dyn CacheBackend> = match &config.redis.url {
        Some(url) => {
            let redis = RedisBackend::connect(url, config.redis.command_timeout())
                .await
                .context("failed to connect to Redis")?;
            info!("connected to Redis");
            Arc::new(redis)
        }
        None => {
            warn!("REDIS_URL not set; running on the in-process cache only");
            Arc::new(MemoryBackend::new())
        }
    };
    let backend = SafeBackend::new(backend);

    let cache = Arc::new(CacheManager::new(
        &config.cache,
        distributed.then(|| backend.clone()),
    ));

    let streams: Arc<dyn StreamStore> = Arc::new(PgStreamStore::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let registry = Arc::new(ViewerPresenceRegistry::new(
        backend,
        streams,
        sessions.clone(),
        &config.presence,
    ));

    let tasks = background::spawn_background_tasks(
        cache,
        registry,
        sessions,
        &config.presence,
        &config.cache,
    );

    info!("presence service running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    background::shutdown_background_tasks(tasks).await;
    Ok(())
}
