//! Trending ranking
//!
//! A sorted set of stream ids scored by current viewer count, updated on
//! every count mutation. Staleness is tolerated; divergence is not, since
//! scores converge to the true count with the next mutation of each stream.

use std::sync::Arc;
use uuid::Uuid;

use super::keys;
use crate::cache::SafeBackend;
use crate::db::StreamStore;
use crate::error::Result;
use crate::models::{ActiveStreamSummary, TrendingStream};

pub struct TrendingRanking {
    backend: SafeBackend,
    streams: Arc<dyn StreamStore>,
}

impl TrendingRanking {
    pub fn new(backend: SafeBackend, streams: Arc<dyn StreamStore>) -> Self {
        Self { backend, streams }
    }

    pub async fn set_score(&self, stream_id: Uuid, viewer_count: i64) {
        self.backend
            .sorted_set_add(keys::TRENDING, &stream_id.to_string(), viewer_count as f64)
            .await;
    }

    pub async fn remove(&self, stream_id: Uuid) {
        self.backend
            .sorted_set_remove(keys::TRENDING, &stream_id.to_string())
            .await;
    }

    /// Top streams by viewer count descending; stream id breaks ties so the
    /// ordering is deterministic. Falls back to a relational top-N over the
    /// mirrored counts when the distributed tier is unreachable.
    pub async fn find_trending(
        &self,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<TrendingStream>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        // With a category filter the zset alone cannot answer; pull the full
        // ranking and join through the active-stream summaries.
        let stop: isize = if category.is_some() {
            -1
        } else {
            limit as isize - 1
        };

        match self
            .backend
            .sorted_set_rev_range(keys::TRENDING, 0, stop)
            .await
        {
            Some(entries) => {
                let mut ranked: Vec<TrendingStream> = entries
                    .iter()
                    .filter_map(|(member, score)| {
                        Uuid::parse_str(member).ok().map(|stream_id| TrendingStream {
                            stream_id,
                            viewer_count: *score as i64,
                        })
                    })
                    .collect();

                ranked.sort_by(|a, b| {
                    b.viewer_count
                        .cmp(&a.viewer_count)
                        .then_with(|| a.stream_id.cmp(&b.stream_id))
                });

                match category {
                    Some(category) => {
                        let mut filtered = Vec::with_capacity(limit);
                        for entry in ranked {
                            if filtered.len() == limit {
                                break;
                            }
                            if self.category_matches(entry.stream_id, category).await {
                                filtered.push(entry);
                            }
                        }
                        Ok(filtered)
                    }
                    None => {
                        ranked.truncate(limit);
                        Ok(ranked)
                    }
                }
            }
            None => {
                let rows = self
                    .streams
                    .top_live_by_viewers(limit as i64, category)
                    .await?;
                Ok(rows
                    .iter()
                    .map(|s| TrendingStream {
                        stream_id: s.id,
                        viewer_count: s.viewer_count,
                    })
                    .collect())
            }
        }
    }

    async fn category_matches(&self, stream_id: Uuid, category: &str) -> bool {
        let Some(Some(json)) = self
            .backend
            .hash_get(keys::ACTIVE_STREAMS, &stream_id.to_string())
            .await
        else {
            return false;
        };
        serde_json::from_str::<ActiveStreamSummary>(&json)
            .map(|summary| summary.category.as_deref() == Some(category))
            .unwrap_or(false)
    }
}
