//! Stream table access
//!
//! Pure data access, no business logic. Status transitions are owned by the
//! broadcast pipeline; this service only reads them and maintains the
//! denormalized viewer counts.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::StreamStore;
use crate::error::Result;
use crate::models::{ActiveStreamFilter, Stream};

const STREAM_COLUMNS: &str = r#"
    id, owner_id, title, category, tags, status,
    viewer_count, peak_viewer_count,
    started_at, ended_at, created_at
"#;

#[derive(Clone)]
pub struct PgStreamStore {
    pool: PgPool,
}

impl PgStreamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamStore for PgStreamStore {
    async fn stream_by_id(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        let row = sqlx::query_as::<_, Stream>(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE id = $1"
        ))
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_live(&self, filter: &ActiveStreamFilter) -> Result<Vec<Stream>> {
        let rows = sqlx::query_as::<_, Stream>(&format!(
            r#"
            SELECT {STREAM_COLUMNS}
            FROM streams
            WHERE status = 'live'
              AND ($1::text IS NULL OR category = $1)
              AND (cardinality($2::text[]) = 0 OR tags && $2)
            ORDER BY started_at DESC NULLS LAST, id ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.category.as_deref())
        .bind(&filter.tags)
        .bind(filter.limit)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn top_live_by_viewers(&self, limit: i64, category: Option<&str>) -> Result<Vec<Stream>> {
        let rows = sqlx::query_as::<_, Stream>(&format!(
            r#"
            SELECT {STREAM_COLUMNS}
            FROM streams
            WHERE status = 'live'
              AND ($2::text IS NULL OR category = $2)
            ORDER BY viewer_count DESC, id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_viewer_count(&self, stream_id: Uuid, count: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE streams
            SET viewer_count = $2,
                peak_viewer_count = GREATEST(peak_viewer_count, $2)
            WHERE id = $1
            "#,
        )
        .bind(stream_id)
        .bind(count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mirrored_viewer_count(&self, stream_id: Uuid) -> Result<Option<i64>> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT viewer_count FROM streams WHERE id = $1",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }
}
