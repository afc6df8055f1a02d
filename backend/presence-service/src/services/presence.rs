//! Viewer presence registry
//!
//! Tracks which users are watching which stream and keeps the concurrent
//! viewer count correct under any interleaving of joins and leaves. The
//! membership set absorbs duplicate joins; the counter only moves when
//! membership actually changed, through the backend's atomic INCR/DECR
//! (never read-modify-write across a suspension point), decrements clamped
//! at zero.
//!
//! The distributed tier is advisory: a join or leave must succeed as long as
//! the relational store is reachable. When Redis is down the distinct open
//! sessions become the count of record until the next successful mirror.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::keys;
use super::{ActiveStreamIndex, TrendingRanking, ViewerCountMirror};
use crate::cache::SafeBackend;
use crate::config::PresenceConfig;
use crate::db::{SessionStore, StreamStore};
use crate::error::{AppError, Result};
use crate::models::{ActiveStreamFilter, ActiveStreamSummary, Stream, StreamStatus, TrendingStream};

pub struct ViewerPresenceRegistry {
    backend: SafeBackend,
    streams: Arc<dyn StreamStore>,
    sessions: Arc<dyn SessionStore>,
    index: Arc<ActiveStreamIndex>,
    trending: Arc<TrendingRanking>,
    mirror: Arc<ViewerCountMirror>,
}

impl ViewerPresenceRegistry {
    pub fn new(
        backend: SafeBackend,
        streams: Arc<dyn StreamStore>,
        sessions: Arc<dyn SessionStore>,
        config: &PresenceConfig,
    ) -> Self {
        let index = Arc::new(ActiveStreamIndex::new(backend.clone(), streams.clone()));
        let trending = Arc::new(TrendingRanking::new(backend.clone(), streams.clone()));
        let mirror = Arc::new(ViewerCountMirror::new(
            streams.clone(),
            config.mirror_interval(),
            config.divergence_warn_threshold,
        ));

        Self {
            backend,
            streams,
            sessions,
            index,
            trending,
            mirror,
        }
    }

    // =========================================================================
    // Presence mutations
    // =========================================================================

    /// Viewer joins a stream. Returns the updated viewer count.
    ///
    /// Idempotent for the count: re-joining while already counted changes
    /// nothing. A session row is still written for every physical join event.
    pub async fn add_viewer(&self, stream_id: Uuid, user_id: Uuid) -> Result<i64> {
        let stream = self.require_stream(stream_id).await?;
        if stream.status != StreamStatus::Live {
            return Err(AppError::invalid_state(format!(
                "stream {} is not live",
                stream_id
            )));
        }

        // Durable trail first: one row per physical join event.
        self.sessions.record_join(stream_id, user_id).await?;

        let member = user_id.to_string();
        match self
            .backend
            .set_add(&keys::stream_audience(stream_id), &member)
            .await
        {
            Some(true) => {
                let count = match self
                    .backend
                    .incr_by(&keys::stream_viewers(stream_id), 1)
                    .await
                {
                    Some(count) => count,
                    // Counter unreachable mid-operation: distinct open
                    // sessions are the truth.
                    None => self.sessions.count_active(stream_id).await?,
                };

                self.trending.set_score(stream_id, count).await;
                self.index.refresh_count(stream_id, count).await;
                self.mirror.record(stream_id, count).await?;

                debug!(stream_id = %stream_id, user_id = %user_id, count = count, "viewer joined");
                Ok(count)
            }
            Some(false) => {
                debug!(stream_id = %stream_id, user_id = %user_id, "duplicate join absorbed");
                Ok(self.read_count(&stream).await)
            }
            None => self.count_from_sessions(stream_id).await,
        }
    }

    /// Viewer leaves a stream. Returns the updated viewer count.
    ///
    /// Removing an absent viewer is a no-op that reports the current count.
    pub async fn remove_viewer(&self, stream_id: Uuid, user_id: Uuid) -> Result<i64> {
        let stream = self.require_stream(stream_id).await?;

        let removed = self
            .backend
            .set_remove(&keys::stream_audience(stream_id), &user_id.to_string())
            .await;

        // Close the trail regardless of membership; no-op for absent viewers.
        self.sessions.close_open_session(stream_id, user_id).await?;

        match removed {
            Some(true) => {
                let counter = keys::stream_viewers(stream_id);
                let count = match self.backend.incr_by(&counter, -1).await {
                    Some(count) if count < 0 => {
                        // Clamp at the floor instead of underflowing.
                        self.backend.set(&counter, "0", None).await;
                        0
                    }
                    Some(count) => count,
                    None => self.sessions.count_active(stream_id).await?,
                };

                self.trending.set_score(stream_id, count).await;
                self.index.refresh_count(stream_id, count).await;
                self.mirror.record(stream_id, count).await?;

                debug!(stream_id = %stream_id, user_id = %user_id, count = count, "viewer left");
                Ok(count)
            }
            Some(false) => Ok(self.read_count(&stream).await),
            None => self.count_from_sessions(stream_id).await,
        }
    }

    /// Refreshes `last_active_at` on the viewer's open session. Does not
    /// touch the counter; a heartbeat from an absent viewer is ignored.
    pub async fn heartbeat(&self, stream_id: Uuid, user_id: Uuid) -> Result<()> {
        let touched = self.sessions.touch(stream_id, user_id).await?;
        if !touched {
            debug!(stream_id = %stream_id, user_id = %user_id, "heartbeat without open session ignored");
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Live counter when reachable, else the mirrored relational value.
    pub async fn viewer_count(&self, stream_id: Uuid) -> Result<i64> {
        if let Some(Some(raw)) = self.backend.get(&keys::stream_viewers(stream_id)).await {
            if let Ok(count) = raw.parse::<i64>() {
                return Ok(count.max(0));
            }
        }
        let stream = self.require_stream(stream_id).await?;
        Ok(stream.viewer_count.max(0))
    }

    /// Counts for many streams in one backend round-trip, with per-stream
    /// relational fallback for the gaps.
    pub async fn viewer_counts(&self, stream_ids: &[Uuid]) -> Result<Vec<(Uuid, i64)>> {
        if stream_ids.is_empty() {
            return Ok(vec![]);
        }

        let counter_keys: Vec<String> = stream_ids
            .iter()
            .map(|id| keys::stream_viewers(*id))
            .collect();
        let cached = self
            .backend
            .get_many(&counter_keys)
            .await
            .unwrap_or_else(|| vec![None; stream_ids.len()]);

        let mut out = Vec::with_capacity(stream_ids.len());
        for (stream_id, raw) in stream_ids.iter().zip(cached) {
            let count = match raw.and_then(|r| r.parse::<i64>().ok()) {
                Some(count) => count.max(0),
                None => self
                    .streams
                    .mirrored_viewer_count(*stream_id)
                    .await?
                    .unwrap_or(0),
            };
            out.push((*stream_id, count));
        }
        Ok(out)
    }

    pub async fn find_active_streams(
        &self,
        filter: &ActiveStreamFilter,
    ) -> Result<Vec<ActiveStreamSummary>> {
        self.index.find_active_streams(filter).await
    }

    pub async fn find_trending(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<TrendingStream>> {
        self.trending.find_trending(limit, category).await
    }

    // =========================================================================
    // Stream lifecycle (transitions are caller-driven; this reacts)
    // =========================================================================

    /// Called after the stream row transitioned to LIVE: registers the
    /// summary with a count of zero and seeds the trending entry.
    pub async fn stream_started(&self, stream_id: Uuid) -> Result<()> {
        let stream = self.require_stream(stream_id).await?;
        if stream.status != StreamStatus::Live {
            return Err(AppError::invalid_state(format!(
                "stream {} is not live",
                stream_id
            )));
        }

        self.index.register(&stream).await;
        self.trending.set_score(stream_id, 0).await;

        info!(stream_id = %stream_id, "stream registered as live");
        Ok(())
    }

    /// Called after the stream row transitioned to ENDED: removes the
    /// summary and trending entry, drops the presence keys, closes any open
    /// sessions and force-mirrors the closing count.
    pub async fn stream_ended(&self, stream_id: Uuid) -> Result<()> {
        let stream = self.require_stream(stream_id).await?;
        if stream.status == StreamStatus::Live {
            return Err(AppError::invalid_state(format!(
                "stream {} is still live",
                stream_id
            )));
        }

        let final_count = self.read_count(&stream).await;

        self.index.unregister(stream_id).await;
        self.trending.remove(stream_id).await;
        self.backend.delete(&keys::stream_viewers(stream_id)).await;
        self.backend.delete(&keys::stream_audience(stream_id)).await;

        let closed = self.sessions.close_all_open(stream_id).await?;
        self.mirror.force(stream_id, final_count).await?;
        self.mirror.forget(stream_id);

        info!(
            stream_id = %stream_id,
            final_count = final_count,
            closed_sessions = closed,
            "stream deregistered"
        );
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn require_stream(&self, stream_id: Uuid) -> Result<Stream> {
        self.streams
            .stream_by_id(stream_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("stream {}", stream_id)))
    }

    async fn read_count(&self, stream: &Stream) -> i64 {
        if let Some(Some(raw)) = self.backend.get(&keys::stream_viewers(stream.id)).await {
            if let Ok(count) = raw.parse::<i64>() {
                return count.max(0);
            }
        }
        stream.viewer_count.max(0)
    }

    /// Distributed tier down: distinct open sessions are the count of record
    /// until the next successful mirror.
    async fn count_from_sessions(&self, stream_id: Uuid) -> Result<i64> {
        let count = self.sessions.count_active(stream_id).await?;
        self.mirror.force(stream_id, count).await?;
        Ok(count)
    }
}
