pub mod backend;
pub mod eviction;
pub mod manager;
pub mod memory;
pub mod redis_backend;

pub use backend::{BackendError, BackendResult, CacheBackend, SafeBackend};
pub use eviction::EvictionStrategy;
pub use manager::{AccessPattern, CacheManager};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
