//! Background task management
//!
//! Centralizes spawning and shutdown of the long-running tasks: the cache
//! sweeper (periodic eviction pass over the in-process store) and the
//! heartbeat reaper (removes viewers whose sessions went stale). Each loop
//! is started once at process initialization and stopped cleanly on
//! shutdown; errors inside a tick are logged and never kill the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::config::{CacheConfig, PresenceConfig};
use crate::db::SessionStore;
use crate::error::AppError;
use crate::services::ViewerPresenceRegistry;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handles for graceful shutdown
pub struct BackgroundTasks {
    shutdown_tx: broadcast::Sender<()>,
    sweeper_handle: Option<JoinHandle<()>>,
    reaper_handle: JoinHandle<()>,
}

pub fn spawn_background_tasks(
    cache: Arc<CacheManager>,
    registry: Arc<ViewerPresenceRegistry>,
    sessions: Arc<dyn SessionStore>,
    presence_config: &PresenceConfig,
    cache_config: &CacheConfig,
) -> BackgroundTasks {
    let (shutdown_tx, _) = broadcast::channel(1);

    // The sweeper only matters when entries live in the in-process store;
    // Redis expires its own keys.
    let sweeper_handle = if cache.uses_local_store() {
        let shutdown_rx = shutdown_tx.subscribe();
        let sweep_interval = cache_config.sweep_interval();
        Some(tokio::spawn(run_sweeper_loop(
            cache,
            sweep_interval,
            shutdown_rx,
        )))
    } else {
        None
    };

    let reaper_handle = tokio::spawn(run_reaper_loop(
        registry,
        sessions,
        presence_config.reaper_interval(),
        presence_config.heartbeat_stale(),
        presence_config.reaper_batch_size,
        shutdown_tx.subscribe(),
    ));

    info!("background tasks spawned");

    BackgroundTasks {
        shutdown_tx,
        sweeper_handle,
        reaper_handle,
    }
}

pub async fn shutdown_background_tasks(tasks: BackgroundTasks) {
    let _ = tasks.shutdown_tx.send(());

    if let Some(handle) = tasks.sweeper_handle {
        join_with_grace(handle, "cache sweeper").await;
    }
    join_with_grace(tasks.reaper_handle, "heartbeat reaper").await;

    info!("background tasks shut down");
}

async fn join_with_grace(handle: JoinHandle<()>, name: &str) {
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(Ok(())) => info!(task = name, "task shut down gracefully"),
        Ok(Err(e)) => warn!(task = name, error = %e, "task terminated abnormally"),
        Err(_) => warn!(task = name, "task did not shut down within grace period"),
    }
}

async fn run_sweeper_loop(
    cache: Arc<CacheManager>,
    sweep_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(sweep_interval);
    info!(interval_secs = sweep_interval.as_secs(), "cache sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cache.sweep_local();
            }
            _ = shutdown.recv() => {
                info!("cache sweeper stopping");
                break;
            }
        }
    }
}

/// Removes viewers whose open session's heartbeat went stale, through the
/// ordinary leave path so counter, trending and mirror stay consistent.
async fn run_reaper_loop(
    registry: Arc<ViewerPresenceRegistry>,
    sessions: Arc<dyn SessionStore>,
    reap_interval: Duration,
    stale_after: Duration,
    batch_size: i64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(reap_interval);
    info!(
        interval_secs = reap_interval.as_secs(),
        stale_secs = stale_after.as_secs(),
        "heartbeat reaper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reap_once(&registry, &sessions, stale_after, batch_size).await;
            }
            _ = shutdown.recv() => {
                info!("heartbeat reaper stopping");
                break;
            }
        }
    }
}

async fn reap_once(
    registry: &ViewerPresenceRegistry,
    sessions: &Arc<dyn SessionStore>,
    stale_after: Duration,
    batch_size: i64,
) {
    let stale = match sessions.stale_open_sessions(stale_after, batch_size).await {
        Ok(stale) => stale,
        Err(e) => {
            warn!(error = %e, "failed to scan for stale sessions");
            return;
        }
    };

    if stale.is_empty() {
        return;
    }

    let mut reaped = 0usize;
    for (stream_id, user_id) in stale {
        match registry.remove_viewer(stream_id, user_id).await {
            Ok(_) => reaped += 1,
            Err(AppError::NotFound(_)) => {
                // Stream row is gone; close the orphaned session directly so
                // it stops matching the stale scan.
                if let Err(e) = sessions.close_open_session(stream_id, user_id).await {
                    warn!(stream_id = %stream_id, user_id = %user_id, error = %e, "failed to close orphaned session");
                }
            }
            Err(e) => {
                warn!(stream_id = %stream_id, user_id = %user_id, error = %e, "failed to reap stale viewer");
            }
        }
    }

    debug!(reaped = reaped, "stale viewers reaped");
}
