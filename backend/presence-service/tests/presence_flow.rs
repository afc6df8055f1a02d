//! End-to-end presence engine tests
//!
//! Drive the full registry + index + trending + mirror against the
//! in-process backend and in-memory store doubles, including the degraded
//! mode where the distributed tier is down.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use presence_service::cache::{
    BackendError, BackendResult, CacheBackend, MemoryBackend, SafeBackend,
};
use presence_service::config::PresenceConfig;
use presence_service::db::{SessionStore, StreamStore};
use presence_service::error::{AppError, Result};
use presence_service::models::{ActiveStreamFilter, Stream, StreamStatus};
use presence_service::services::ViewerPresenceRegistry;

// =============================================================================
// In-memory store doubles
// =============================================================================

#[derive(Default)]
struct InMemoryStreamStore {
    rows: Mutex<HashMap<Uuid, Stream>>,
}

impl InMemoryStreamStore {
    fn insert(&self, stream: Stream) {
        self.rows.lock().unwrap().insert(stream.id, stream);
    }

    fn set_status(&self, stream_id: Uuid, status: StreamStatus) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(stream) = rows.get_mut(&stream_id) {
            stream.status = status;
            if status == StreamStatus::Ended {
                stream.ended_at = Some(Utc::now());
            }
        }
    }

    fn viewer_count(&self, stream_id: Uuid) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .get(&stream_id)
            .map(|s| s.viewer_count)
            .unwrap_or(0)
    }

    fn peak(&self, stream_id: Uuid) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .get(&stream_id)
            .map(|s| s.peak_viewer_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn stream_by_id(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        Ok(self.rows.lock().unwrap().get(&stream_id).cloned())
    }

    async fn list_live(&self, filter: &ActiveStreamFilter) -> Result<Vec<Stream>> {
        let rows = self.rows.lock().unwrap();
        let mut live: Vec<Stream> = rows
            .values()
            .filter(|s| s.status == StreamStatus::Live)
            .filter(|s| {
                filter.category.is_none() || s.category.as_deref() == filter.category.as_deref()
            })
            .filter(|s| {
                filter.tags.is_empty() || s.tags.iter().any(|t| filter.tags.contains(t))
            })
            .cloned()
            .collect();
        live.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(a.id.cmp(&b.id)));
        Ok(live
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn top_live_by_viewers(
        &self,
        limit: i64,
        category: Option<&str>,
    ) -> Result<Vec<Stream>> {
        let rows = self.rows.lock().unwrap();
        let mut live: Vec<Stream> = rows
            .values()
            .filter(|s| s.status == StreamStatus::Live)
            .filter(|s| category.is_none() || s.category.as_deref() == category)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.viewer_count.cmp(&a.viewer_count).then(a.id.cmp(&b.id)));
        live.truncate(limit.max(0) as usize);
        Ok(live)
    }

    async fn update_viewer_count(&self, stream_id: Uuid, count: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(stream) = rows.get_mut(&stream_id) {
            stream.viewer_count = count;
            stream.peak_viewer_count = stream.peak_viewer_count.max(count);
        }
        Ok(())
    }

    async fn mirrored_viewer_count(&self, stream_id: Uuid) -> Result<Option<i64>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&stream_id)
            .map(|s| s.viewer_count))
    }
}

#[derive(Clone)]
struct SessionRow {
    stream_id: Uuid,
    user_id: Uuid,
    last_active_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct InMemorySessionStore {
    rows: Mutex<Vec<SessionRow>>,
}

impl InMemorySessionStore {
    fn row_count(&self, stream_id: Uuid, user_id: Uuid) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stream_id == stream_id && r.user_id == user_id)
            .count()
    }

    fn backdate_open(&self, stream_id: Uuid, user_id: Uuid, by: ChronoDuration) {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if row.stream_id == stream_id && row.user_id == user_id && row.left_at.is_none() {
                row.last_active_at = Utc::now() - by;
            }
        }
    }

    fn open_last_active(&self, stream_id: Uuid, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.stream_id == stream_id && r.user_id == user_id && r.left_at.is_none())
            .map(|r| r.last_active_at)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn record_join(&self, stream_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if row.stream_id == stream_id && row.user_id == user_id && row.left_at.is_none() {
                row.left_at = Some(Utc::now());
            }
        }
        rows.push(SessionRow {
            stream_id,
            user_id,
            last_active_at: Utc::now(),
            left_at: None,
        });
        Ok(())
    }

    async fn close_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut().rev() {
            if row.stream_id == stream_id && row.user_id == user_id && row.left_at.is_none() {
                row.left_at = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn close_all_open(&self, stream_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut closed = 0u64;
        for row in rows.iter_mut() {
            if row.stream_id == stream_id && row.left_at.is_none() {
                row.left_at = Some(Utc::now());
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn touch(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let mut touched = false;
        for row in rows.iter_mut() {
            if row.stream_id == stream_id && row.user_id == user_id && row.left_at.is_none() {
                row.last_active_at = Utc::now();
                touched = true;
            }
        }
        Ok(touched)
    }

    async fn has_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.stream_id == stream_id && r.user_id == user_id && r.left_at.is_none()))
    }

    async fn count_active(&self, stream_id: Uuid) -> Result<i64> {
        let rows = self.rows.lock().unwrap();
        let mut users: Vec<Uuid> = rows
            .iter()
            .filter(|r| r.stream_id == stream_id && r.left_at.is_none())
            .map(|r| r.user_id)
            .collect();
        users.sort();
        users.dedup();
        Ok(users.len() as i64)
    }

    async fn stale_open_sessions(
        &self,
        idle: Duration,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>> {
        let cutoff = Utc::now() - ChronoDuration::from_std(idle).unwrap();
        let rows = self.rows.lock().unwrap();
        let mut stale: Vec<(DateTime<Utc>, Uuid, Uuid)> = rows
            .iter()
            .filter(|r| r.left_at.is_none() && r.last_active_at < cutoff)
            .map(|r| (r.last_active_at, r.stream_id, r.user_id))
            .collect();
        stale.sort_by_key(|(at, _, _)| *at);
        Ok(stale
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, s, u)| (s, u))
            .collect())
    }
}

/// Backend double where the distributed tier is unreachable
struct DownBackend;

fn down() -> BackendError {
    BackendError::Timeout(Duration::from_millis(100))
}

#[async_trait]
impl CacheBackend for DownBackend {
    async fn get(&self, _: &str) -> BackendResult<Option<String>> {
        Err(down())
    }
    async fn get_many(&self, _: &[String]) -> BackendResult<Vec<Option<String>>> {
        Err(down())
    }
    async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> BackendResult<()> {
        Err(down())
    }
    async fn delete(&self, _: &str) -> BackendResult<()> {
        Err(down())
    }
    async fn delete_by_prefix(&self, _: &str) -> BackendResult<u64> {
        Err(down())
    }
    async fn incr_by(&self, _: &str, _: i64) -> BackendResult<i64> {
        Err(down())
    }
    async fn set_add(&self, _: &str, _: &str) -> BackendResult<bool> {
        Err(down())
    }
    async fn set_remove(&self, _: &str, _: &str) -> BackendResult<bool> {
        Err(down())
    }
    async fn set_contains(&self, _: &str, _: &str) -> BackendResult<bool> {
        Err(down())
    }
    async fn hash_set(&self, _: &str, _: &str, _: &str) -> BackendResult<()> {
        Err(down())
    }
    async fn hash_get(&self, _: &str, _: &str) -> BackendResult<Option<String>> {
        Err(down())
    }
    async fn hash_delete(&self, _: &str, _: &str) -> BackendResult<()> {
        Err(down())
    }
    async fn hash_values(&self, _: &str) -> BackendResult<Vec<String>> {
        Err(down())
    }
    async fn sorted_set_add(&self, _: &str, _: &str, _: f64) -> BackendResult<()> {
        Err(down())
    }
    async fn sorted_set_remove(&self, _: &str, _: &str) -> BackendResult<()> {
        Err(down())
    }
    async fn sorted_set_rev_range(
        &self,
        _: &str,
        _: isize,
        _: isize,
    ) -> BackendResult<Vec<(String, f64)>> {
        Err(down())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct TestEngine {
    registry: Arc<ViewerPresenceRegistry>,
    streams: Arc<InMemoryStreamStore>,
    sessions: Arc<InMemorySessionStore>,
}

fn presence_config() -> PresenceConfig {
    PresenceConfig {
        // Zero interval: every mutation mirrors, so the relational copy is
        // always current in these tests.
        mirror_interval_secs: 0,
        divergence_warn_threshold: 50,
        heartbeat_stale_secs: 120,
        reaper_interval_secs: 30,
        reaper_batch_size: 500,
    }
}

fn engine_with(backend: Arc<dyn CacheBackend>) -> TestEngine {
    let streams = Arc::new(InMemoryStreamStore::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let registry = Arc::new(ViewerPresenceRegistry::new(
        SafeBackend::new(backend),
        streams.clone(),
        sessions.clone(),
        &presence_config(),
    ));
    TestEngine {
        registry,
        streams,
        sessions,
    }
}

fn engine() -> TestEngine {
    engine_with(Arc::new(MemoryBackend::new()))
}

fn live_stream(title: &str, category: Option<&str>, tags: &[&str]) -> Stream {
    Stream {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        title: title.to_string(),
        category: category.map(String::from),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        status: StreamStatus::Live,
        viewer_count: 0,
        peak_viewer_count: 0,
        started_at: Some(Utc::now()),
        ended_at: None,
        created_at: Utc::now(),
    }
}

async fn start_live_stream(engine: &TestEngine, stream: &Stream) {
    engine.streams.insert(stream.clone());
    engine.registry.stream_started(stream.id).await.unwrap();
}

async fn fill_viewers(engine: &TestEngine, stream_id: Uuid, n: usize) {
    for _ in 0..n {
        engine
            .registry
            .add_viewer(stream_id, Uuid::new_v4())
            .await
            .unwrap();
    }
}

// =============================================================================
// Join / leave semantics
// =============================================================================

#[tokio::test]
async fn test_duplicate_join_counts_once_but_records_both_events() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;
    let user = Uuid::new_v4();

    assert_eq!(engine.registry.add_viewer(stream.id, user).await.unwrap(), 1);
    assert_eq!(engine.registry.add_viewer(stream.id, user).await.unwrap(), 1);

    // analytics trail keeps one row per physical join event
    assert_eq!(engine.sessions.row_count(stream.id, user), 2);
}

#[tokio::test]
async fn test_remove_absent_viewer_is_idempotent() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;

    let watcher = Uuid::new_v4();
    engine.registry.add_viewer(stream.id, watcher).await.unwrap();

    let stranger = Uuid::new_v4();
    assert_eq!(
        engine.registry.remove_viewer(stream.id, stranger).await.unwrap(),
        1
    );

    // leaving twice is also a no-op
    assert_eq!(engine.registry.remove_viewer(stream.id, watcher).await.unwrap(), 0);
    assert_eq!(engine.registry.remove_viewer(stream.id, watcher).await.unwrap(), 0);
}

#[tokio::test]
async fn test_count_never_negative() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;
    let user = Uuid::new_v4();

    for _ in 0..5 {
        let count = engine.registry.remove_viewer(stream.id, user).await.unwrap();
        assert!(count >= 0);
    }

    engine.registry.add_viewer(stream.id, user).await.unwrap();
    engine.registry.remove_viewer(stream.id, user).await.unwrap();
    let count = engine.registry.remove_viewer(stream.id, user).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_concurrent_distinct_joins_all_counted() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;

    let n = 25;
    let joins = (0..n).map(|_| {
        let registry = engine.registry.clone();
        let stream_id = stream.id;
        tokio::spawn(async move { registry.add_viewer(stream_id, Uuid::new_v4()).await })
    });

    for result in join_all(joins).await {
        result.unwrap().unwrap();
    }

    assert_eq!(engine.registry.viewer_count(stream.id).await.unwrap(), n);
}

#[tokio::test]
async fn test_join_requires_live_stream() {
    let engine = engine();
    let mut stream = live_stream("s", None, &[]);
    stream.status = StreamStatus::Scheduled;
    engine.streams.insert(stream.clone());

    let err = engine
        .registry
        .add_viewer(stream.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = engine
        .registry
        .add_viewer(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_mirror_retains_peak() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;

    let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for user in &users {
        engine.registry.add_viewer(stream.id, *user).await.unwrap();
    }
    for user in &users {
        engine.registry.remove_viewer(stream.id, *user).await.unwrap();
    }

    assert_eq!(engine.streams.viewer_count(stream.id), 0);
    assert_eq!(engine.streams.peak(stream.id), 3);
}

// =============================================================================
// Heartbeats
// =============================================================================

#[tokio::test]
async fn test_heartbeat_refreshes_open_session_only() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;
    let user = Uuid::new_v4();

    engine.registry.add_viewer(stream.id, user).await.unwrap();
    let before = engine.sessions.open_last_active(stream.id, user).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.registry.heartbeat(stream.id, user).await.unwrap();
    let after = engine.sessions.open_last_active(stream.id, user).unwrap();
    assert!(after > before);

    // absent viewer: no error, no effect on the count
    engine
        .registry
        .heartbeat(stream.id, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(engine.registry.viewer_count(stream.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_stale_sessions_surface_for_reaping() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;

    let idle_user = Uuid::new_v4();
    let fresh_user = Uuid::new_v4();
    engine.registry.add_viewer(stream.id, idle_user).await.unwrap();
    engine.registry.add_viewer(stream.id, fresh_user).await.unwrap();

    engine
        .sessions
        .backdate_open(stream.id, idle_user, ChronoDuration::seconds(600));

    let stale = engine
        .sessions
        .stale_open_sessions(Duration::from_secs(120), 100)
        .await
        .unwrap();
    assert_eq!(stale, vec![(stream.id, idle_user)]);

    // reaping drives the ordinary leave path
    engine.registry.remove_viewer(stream.id, idle_user).await.unwrap();
    assert_eq!(engine.registry.viewer_count(stream.id).await.unwrap(), 1);
    assert!(engine
        .sessions
        .stale_open_sessions(Duration::from_secs(120), 100)
        .await
        .unwrap()
        .is_empty());
}

// =============================================================================
// Discovery: active index and trending
// =============================================================================

#[tokio::test]
async fn test_find_trending_orders_by_count_desc() {
    let engine = engine();
    let s1 = live_stream("s1", None, &[]);
    let s2 = live_stream("s2", None, &[]);
    let s3 = live_stream("s3", None, &[]);
    for s in [&s1, &s2, &s3] {
        start_live_stream(&engine, s).await;
    }

    fill_viewers(&engine, s1.id, 10).await;
    fill_viewers(&engine, s2.id, 50).await;
    fill_viewers(&engine, s3.id, 5).await;

    let top = engine.registry.find_trending(2, None).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].stream_id, s2.id);
    assert_eq!(top[0].viewer_count, 50);
    assert_eq!(top[1].stream_id, s1.id);
    assert_eq!(top[1].viewer_count, 10);
}

#[tokio::test]
async fn test_find_trending_with_category_filter() {
    let engine = engine();
    let gaming = live_stream("g", Some("gaming"), &[]);
    let music = live_stream("m", Some("music"), &[]);
    for s in [&gaming, &music] {
        start_live_stream(&engine, s).await;
    }

    fill_viewers(&engine, gaming.id, 3).await;
    fill_viewers(&engine, music.id, 8).await;

    let top = engine
        .registry
        .find_trending(5, Some("gaming"))
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].stream_id, gaming.id);
}

#[tokio::test]
async fn test_find_active_streams_tag_filter_is_or() {
    let engine = engine();
    let stream = live_stream("s", None, &["gaming", "irl"]);
    start_live_stream(&engine, &stream).await;

    let hit = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            tags: vec!["music".to_string(), "gaming".to_string()],
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hit.len(), 1);

    let miss = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            tags: vec!["music".to_string()],
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(miss.is_empty());
}

#[tokio::test]
async fn test_find_active_streams_sorts_and_paginates() {
    let engine = engine();
    let mut streams = Vec::new();
    for i in 0..3 {
        let mut s = live_stream(&format!("s{}", i), None, &[]);
        // oldest first in creation order, newest start wins the listing
        s.started_at = Some(Utc::now() - ChronoDuration::seconds(100 - i));
        streams.push(s);
    }
    for s in &streams {
        start_live_stream(&engine, s).await;
    }

    let first_page = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].stream_id, streams[2].id);
    assert_eq!(first_page[1].stream_id, streams[1].id);

    let second_page = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            page: 1,
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].stream_id, streams[0].id);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_ended_stream_leaves_index_and_count_falls_back_to_mirror() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    start_live_stream(&engine, &stream).await;

    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    engine.registry.add_viewer(stream.id, u1).await.unwrap();
    engine.registry.add_viewer(stream.id, u2).await.unwrap();

    engine.streams.set_status(stream.id, StreamStatus::Ended);
    engine.registry.stream_ended(stream.id).await.unwrap();

    let listed = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(listed.is_empty());

    assert!(engine.registry.find_trending(10, None).await.unwrap().is_empty());

    // counter keys are gone; the mirrored relational value answers
    assert_eq!(engine.registry.viewer_count(stream.id).await.unwrap(), 2);

    // open sessions were closed with the stream
    assert_eq!(engine.sessions.count_active(stream.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_summary_registered_with_zero_count() {
    let engine = engine();
    let stream = live_stream("s", None, &[]);
    engine.streams.insert(stream.clone());
    engine.registry.stream_started(stream.id).await.unwrap();

    let listed = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].viewer_count, 0);

    engine.registry.add_viewer(stream.id, Uuid::new_v4()).await.unwrap();
    let listed = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed[0].viewer_count, 1);
}

// =============================================================================
// Degraded mode: distributed tier down
// =============================================================================

#[tokio::test]
async fn test_presence_survives_backend_outage() {
    let engine = engine_with(Arc::new(DownBackend));
    let stream = live_stream("s", None, &[]);
    engine.streams.insert(stream.clone());
    // lifecycle registration is best-effort against the dead backend
    engine.registry.stream_started(stream.id).await.unwrap();

    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    // joins succeed; distinct open sessions are the count of record
    assert_eq!(engine.registry.add_viewer(stream.id, u1).await.unwrap(), 1);
    assert_eq!(engine.registry.add_viewer(stream.id, u2).await.unwrap(), 2);
    // duplicate join still absorbed through the session trail
    assert_eq!(engine.registry.add_viewer(stream.id, u1).await.unwrap(), 2);

    assert_eq!(engine.registry.remove_viewer(stream.id, u1).await.unwrap(), 1);

    // reads fall back to the mirrored relational value
    assert_eq!(engine.registry.viewer_count(stream.id).await.unwrap(), 1);
    assert_eq!(
        engine.registry.viewer_counts(&[stream.id]).await.unwrap(),
        vec![(stream.id, 1)]
    );
}

#[tokio::test]
async fn test_listing_falls_back_to_relational_store() {
    let engine = engine_with(Arc::new(DownBackend));
    let gaming = live_stream("g", Some("gaming"), &["fps"]);
    let music = live_stream("m", Some("music"), &["dj"]);
    engine.streams.insert(gaming.clone());
    engine.streams.insert(music.clone());

    let listed = engine
        .registry
        .find_active_streams(&ActiveStreamFilter {
            category: Some("gaming".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].stream_id, gaming.id);

    // trending falls back to the mirrored counts
    engine.streams.update_viewer_count(music.id, 9).await.unwrap();
    engine.streams.update_viewer_count(gaming.id, 4).await.unwrap();
    let top = engine.registry.find_trending(2, None).await.unwrap();
    assert_eq!(top[0].stream_id, music.id);
    assert_eq!(top[1].stream_id, gaming.id);
}
