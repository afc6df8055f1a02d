//! Active-stream index
//!
//! A hash of stream id → JSON summary, holding exactly the streams that are
//! currently LIVE. Inserted on the transition to LIVE, removed on ENDED.
//! Listing reads the hash when the distributed tier is up and falls back to
//! a relational `status = 'live'` query otherwise.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::keys;
use crate::cache::SafeBackend;
use crate::db::StreamStore;
use crate::error::Result;
use crate::models::{ActiveStreamFilter, ActiveStreamSummary, Stream};

pub struct ActiveStreamIndex {
    backend: SafeBackend,
    streams: Arc<dyn StreamStore>,
}

impl ActiveStreamIndex {
    pub fn new(backend: SafeBackend, streams: Arc<dyn StreamStore>) -> Self {
        Self { backend, streams }
    }

    /// Registers a freshly-live stream with a viewer count of zero.
    pub async fn register(&self, stream: &Stream) {
        let mut summary = ActiveStreamSummary::from(stream);
        summary.viewer_count = 0;

        match serde_json::to_string(&summary) {
            Ok(json) => {
                self.backend
                    .hash_set(keys::ACTIVE_STREAMS, &stream.id.to_string(), &json)
                    .await;
            }
            Err(e) => {
                warn!(stream_id = %stream.id, error = %e, "failed to serialize stream summary");
            }
        }
    }

    pub async fn unregister(&self, stream_id: Uuid) {
        self.backend
            .hash_delete(keys::ACTIVE_STREAMS, &stream_id.to_string())
            .await;
    }

    /// Best-effort refresh of the summary's viewer count after a mutation.
    pub async fn refresh_count(&self, stream_id: Uuid, count: i64) {
        let field = stream_id.to_string();
        let Some(Some(json)) = self.backend.hash_get(keys::ACTIVE_STREAMS, &field).await else {
            return;
        };
        let Ok(mut summary) = serde_json::from_str::<ActiveStreamSummary>(&json) else {
            warn!(stream_id = %stream_id, "discarding undecodable stream summary");
            return;
        };

        summary.viewer_count = count;
        if let Ok(json) = serde_json::to_string(&summary) {
            self.backend
                .hash_set(keys::ACTIVE_STREAMS, &field, &json)
                .await;
        }
    }

    pub async fn summary(&self, stream_id: Uuid) -> Option<ActiveStreamSummary> {
        let json = self
            .backend
            .hash_get(keys::ACTIVE_STREAMS, &stream_id.to_string())
            .await
            .flatten()?;
        serde_json::from_str(&json).ok()
    }

    /// Lists LIVE streams: exact category match, any-tag OR filter, newest
    /// start first, offset/limit pagination.
    pub async fn find_active_streams(
        &self,
        filter: &ActiveStreamFilter,
    ) -> Result<Vec<ActiveStreamSummary>> {
        match self.backend.hash_values(keys::ACTIVE_STREAMS).await {
            Some(raw) => {
                let mut summaries: Vec<ActiveStreamSummary> = raw
                    .iter()
                    .filter_map(|json| match serde_json::from_str(json) {
                        Ok(summary) => Some(summary),
                        Err(e) => {
                            warn!(error = %e, "skipping undecodable stream summary");
                            None
                        }
                    })
                    .filter(|summary| filter.matches(summary))
                    .collect();

                summaries.sort_by(|a, b| {
                    b.started_at
                        .cmp(&a.started_at)
                        .then_with(|| a.stream_id.cmp(&b.stream_id))
                });

                Ok(summaries
                    .into_iter()
                    .skip(filter.offset().max(0) as usize)
                    .take(filter.limit.max(0) as usize)
                    .collect())
            }
            None => {
                let rows = self.streams.list_live(filter).await?;
                Ok(rows.iter().map(ActiveStreamSummary::from).collect())
            }
        }
    }
}
