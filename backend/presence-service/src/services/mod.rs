pub mod active_streams;
pub mod mirror;
pub mod presence;
pub mod trending;

pub use active_streams::ActiveStreamIndex;
pub use mirror::ViewerCountMirror;
pub use presence::ViewerPresenceRegistry;
pub use trending::TrendingRanking;

use uuid::Uuid;

/// Redis key layout shared by the presence services.
pub(crate) mod keys {
    use super::Uuid;

    /// Hash: stream id → JSON active-stream summary
    pub const ACTIVE_STREAMS: &str = "streams:active";

    /// Sorted set: stream id scored by current viewer count
    pub const TRENDING: &str = "streams:trending";

    /// Integer counter of current viewers
    pub fn stream_viewers(stream_id: Uuid) -> String {
        format!("stream:{}:viewers", stream_id)
    }

    /// Set of user ids currently watching
    pub fn stream_audience(stream_id: Uuid) -> String {
        format!("stream:{}:audience", stream_id)
    }
}
