//! Viewer session table access
//!
//! Session rows are the analytics trail and the fallback source of truth for
//! live counts while the cache tier is down. Rows are closed, never deleted.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::SessionStore;
use crate::error::Result;

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn record_join(&self, stream_id: Uuid, user_id: Uuid) -> Result<()> {
        // At most one active session per (stream, user): a re-join closes the
        // previous open row while still leaving one row per join event.
        sqlx::query(
            r#"
            WITH closed AS (
                UPDATE viewer_sessions
                SET left_at = NOW()
                WHERE stream_id = $1 AND user_id = $2 AND left_at IS NULL
            )
            INSERT INTO viewer_sessions (stream_id, user_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(stream_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE viewer_sessions
            SET left_at = NOW()
            WHERE id = (
                SELECT id FROM viewer_sessions
                WHERE stream_id = $1 AND user_id = $2 AND left_at IS NULL
                ORDER BY joined_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(stream_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close_all_open(&self, stream_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE viewer_sessions
            SET left_at = NOW()
            WHERE stream_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(stream_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn touch(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE viewer_sessions
            SET last_active_at = NOW()
            WHERE stream_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(stream_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_open_session(&self, stream_id: Uuid, user_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM viewer_sessions
                WHERE stream_id = $1 AND user_id = $2 AND left_at IS NULL
            )
            "#,
        )
        .bind(stream_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count_active(&self, stream_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT user_id)
            FROM viewer_sessions
            WHERE stream_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(stream_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn stale_open_sessions(
        &self,
        idle: Duration,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT stream_id, user_id
            FROM viewer_sessions
            WHERE left_at IS NULL
              AND last_active_at < NOW() - ($1::bigint * INTERVAL '1 second')
            ORDER BY last_active_at ASC
            LIMIT $2
            "#,
        )
        .bind(idle.as_secs() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    #[ignore]
    #[tokio::test]
    async fn test_session_lifecycle_against_live_db() {
        // Requires DATABASE_URL; run with: cargo test -- --ignored
    }
}
