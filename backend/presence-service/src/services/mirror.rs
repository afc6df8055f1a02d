//! Viewer count mirror
//!
//! Copies the fast-tier count into the durable stream row so the relational
//! store stays approximately current and can answer when Redis is gone.
//! Writes are throttled per stream on a time basis, with an unthrottled
//! force path for stream end. A mutation-count cadence would be fragile: a
//! decrement sequence can skip the sync point entirely depending on parity.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::StreamStore;
use crate::error::Result;

pub struct ViewerCountMirror {
    streams: Arc<dyn StreamStore>,
    last_sync: DashMap<Uuid, Instant>,
    interval: Duration,
    divergence_warn_threshold: i64,
}

impl ViewerCountMirror {
    pub fn new(
        streams: Arc<dyn StreamStore>,
        interval: Duration,
        divergence_warn_threshold: i64,
    ) -> Self {
        Self {
            streams,
            last_sync: DashMap::new(),
            interval,
            divergence_warn_threshold,
        }
    }

    /// Throttled mirror: at most one durable write per stream per interval.
    pub async fn record(&self, stream_id: Uuid, count: i64) -> Result<()> {
        let due = match self.last_sync.get(&stream_id) {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        };
        if !due {
            return Ok(());
        }
        self.sync(stream_id, count).await
    }

    /// Unthrottled mirror for lifecycle edges (final count on stream end).
    pub async fn force(&self, stream_id: Uuid, count: i64) -> Result<()> {
        self.sync(stream_id, count).await
    }

    /// Drops the throttle stamp once a stream is gone.
    pub fn forget(&self, stream_id: Uuid) {
        self.last_sync.remove(&stream_id);
    }

    async fn sync(&self, stream_id: Uuid, count: i64) -> Result<()> {
        if let Some(mirrored) = self.streams.mirrored_viewer_count(stream_id).await? {
            let drift = (mirrored - count).abs();
            if drift > self.divergence_warn_threshold {
                // Observability only; the write below is the correction.
                warn!(
                    stream_id = %stream_id,
                    mirrored = mirrored,
                    live = count,
                    drift = drift,
                    "viewer count drift exceeds threshold"
                );
            }
        }

        self.streams.update_viewer_count(stream_id, count).await?;
        self.last_sync.insert(stream_id, Instant::now());
        debug!(stream_id = %stream_id, count = count, "mirrored viewer count");
        Ok(())
    }
}
