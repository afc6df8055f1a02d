//! Durable storage layer
//!
//! The relational store is the source of truth; the cache tier is advisory.
//! Consumers depend on the `StreamStore`/`SessionStore` seams so the engine
//! can run against in-memory doubles in tests.

pub mod session_repo;
pub mod stream_repo;

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ActiveStreamFilter, Stream};

pub use session_repo::PgSessionStore;
pub use stream_repo::PgStreamStore;

#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn stream_by_id(&self, stream_id: Uuid) -> Result<Option<Stream>>;

    /// LIVE streams matching the filter, newest start first.
    async fn list_live(&self, filter: &ActiveStreamFilter) -> Result<Vec<Stream>>;

    /// LIVE streams by mirrored viewer count descending, id ascending on ties.
    async fn top_live_by_viewers(&self, limit: i64, category: Option<&str>) -> Result<Vec<Stream>>;

    /// Refresh the denormalized count; the peak only ever ratchets up.
    async fn update_viewer_count(&self, stream_id: Uuid, count: i64) -> Result<()>;

    async fn mirrored_viewer_count(&self, stream_id: Uuid) -> Result<Option<i64>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// One row per physical join event, even for already-counted viewers.
    /// A previous open session of the same pair is closed first, keeping at
    /// most one active session per viewer.
    async fn record_join(&self, stream_id: Uuid, user_id: Uuid) -> Result<()>;

    /// Closes the most recent open session; false when none was open.
    async fn close_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Closes every open session of a stream (stream end). Returns how many.
    async fn close_all_open(&self, stream_id: Uuid) -> Result<u64>;

    /// Heartbeat: refresh `last_active_at` on the open session, if any.
    async fn touch(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn has_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Distinct users with an open session: the relational live count.
    async fn count_active(&self, stream_id: Uuid) -> Result<i64>;

    /// Open sessions whose heartbeat went stale, oldest first.
    async fn stale_open_sessions(&self, idle: Duration, limit: i64)
        -> Result<Vec<(Uuid, Uuid)>>;
}
