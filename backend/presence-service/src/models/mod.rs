//! Data models for viewer presence and stream discovery
//!
//! These are the contract between callers (HTTP controllers, WebSocket
//! fan-out) and the service layer: plain data, no framework types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Stream Status
// =============================================================================

/// Stream lifecycle status
///
/// Transitions are caller-driven (the broadcast pipeline owns them); this
/// core consumes them as preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Stream created but not yet broadcasting
    Scheduled,
    /// Actively broadcasting
    Live,
    /// Broadcast finished
    Ended,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }
}

// =============================================================================
// Durable rows
// =============================================================================

/// Database row for the `streams` table
///
/// `viewer_count` is the denormalized durable copy, refreshed by the count
/// mirror; the live value is the Redis counter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stream {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub status: StreamStatus,
    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Database row for the `viewer_sessions` table
///
/// One row per physical join event, retained for analytics; `left_at` is set
/// on leave, rows are never hard-deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ViewerSession {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Cached projections
// =============================================================================

/// Cached projection of a LIVE stream, stored in the active-stream index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveStreamSummary {
    pub stream_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub viewer_count: i64,
}

impl From<&Stream> for ActiveStreamSummary {
    fn from(stream: &Stream) -> Self {
        ActiveStreamSummary {
            stream_id: stream.id,
            title: stream.title.clone(),
            category: stream.category.clone(),
            tags: stream.tags.clone(),
            started_at: stream.started_at,
            viewer_count: stream.viewer_count,
        }
    }
}

/// Entry in the trending ranking (score = current viewer count)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingStream {
    pub stream_id: Uuid,
    pub viewer_count: i64,
}

// =============================================================================
// Query parameters
// =============================================================================

/// Filter and pagination for active-stream listings
///
/// `category` is an exact match; `tags` matches streams carrying *any* of
/// the requested tags. Results are ordered by start time descending.
#[derive(Debug, Clone, Default)]
pub struct ActiveStreamFilter {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub page: i64,
    pub limit: i64,
}

impl ActiveStreamFilter {
    pub fn offset(&self) -> i64 {
        self.page.max(0) * self.limit.max(0)
    }

    pub fn matches(&self, summary: &ActiveStreamSummary) -> bool {
        if let Some(category) = &self.category {
            if summary.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() {
            // OR semantics: any shared tag qualifies
            if !summary.tags.iter().any(|t| self.tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(category: Option<&str>, tags: &[&str]) -> ActiveStreamSummary {
        ActiveStreamSummary {
            stream_id: Uuid::new_v4(),
            title: "test".to_string(),
            category: category.map(String::from),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            started_at: Some(Utc::now()),
            viewer_count: 0,
        }
    }

    #[test]
    fn test_stream_status_serialization() {
        assert_eq!(StreamStatus::Scheduled.as_str(), "scheduled");
        assert_eq!(StreamStatus::Live.as_str(), "live");
        assert_eq!(StreamStatus::Ended.as_str(), "ended");

        let json = serde_json::to_string(&StreamStatus::Live).unwrap();
        assert_eq!(json, "\"live\"");
    }

    #[test]
    fn test_tag_filter_or_semantics() {
        let s = summary(None, &["gaming", "irl"]);

        let filter = ActiveStreamFilter {
            tags: vec!["music".to_string(), "gaming".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&s));

        let filter = ActiveStreamFilter {
            tags: vec!["music".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&s));
    }

    #[test]
    fn test_category_filter_exact_match() {
        let s = summary(Some("gaming"), &[]);

        let filter = ActiveStreamFilter {
            category: Some("gaming".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&s));

        let filter = ActiveStreamFilter {
            category: Some("music".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&s));
    }

    #[test]
    fn test_filter_offset() {
        let filter = ActiveStreamFilter {
            page: 2,
            limit: 25,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 50);
    }

    #[test]
    fn test_summary_roundtrip() {
        let s = summary(Some("music"), &["live", "dj"]);
        let json = serde_json::to_string(&s).unwrap();
        let back: ActiveStreamSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stream_id, s.stream_id);
        assert_eq!(back.tags, s.tags);
    }
}
