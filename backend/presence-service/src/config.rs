use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::cache::EvictionStrategy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Unset = run on the in-process fallback cache only
    pub url: Option<String>,

    #[serde(default = "default_redis_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl RedisConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,

    #[serde(default = "default_cache_default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_cache_max_items")]
    pub max_items: usize,

    #[serde(default)]
    pub eviction_strategy: EvictionStrategy,

    #[serde(default = "default_cache_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Per-stream floor between two mirror writes of the viewer count
    #[serde(default = "default_mirror_interval_secs")]
    pub mirror_interval_secs: u64,

    /// Drift between live and mirrored count that triggers a consistency warning
    #[serde(default = "default_divergence_warn_threshold")]
    pub divergence_warn_threshold: i64,

    /// Open sessions idle longer than this are reaped
    #[serde(default = "default_heartbeat_stale_secs")]
    pub heartbeat_stale_secs: u64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    #[serde(default = "default_reaper_batch_size")]
    pub reaper_batch_size: i64,
}

impl PresenceConfig {
    pub fn mirror_interval(&self) -> Duration {
        Duration::from_secs(self.mirror_interval_secs)
    }

    pub fn heartbeat_stale(&self) -> Duration {
        Duration::from_secs(self.heartbeat_stale_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_redis_command_timeout_ms() -> u64 {
    500
}

fn default_cache_namespace() -> String {
    "pulse".to_string()
}

fn default_cache_default_ttl_secs() -> u64 {
    300
}

fn default_cache_max_items() -> usize {
    10_000
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

fn default_mirror_interval_secs() -> u64 {
    15
}

fn default_divergence_warn_threshold() -> i64 {
    50
}

fn default_heartbeat_stale_secs() -> u64 {
    120
}

fn default_reaper_interval_secs() -> u64 {
    30
}

fn default_reaper_batch_size() -> i64 {
    500
}

impl Config {
    pub fn from_env() -> Self {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", default_db_max_connections()),
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").ok(),
            command_timeout_ms: env_parsed(
                "REDIS_COMMAND_TIMEOUT_MS",
                default_redis_command_timeout_ms(),
            ),
        };

        let cache = CacheConfig {
            namespace: env::var("CACHE_NAMESPACE").unwrap_or_else(|_| default_cache_namespace()),
            default_ttl_secs: env_parsed("CACHE_DEFAULT_TTL_SECS", default_cache_default_ttl_secs()),
            max_items: env_parsed("CACHE_MAX_ITEMS", default_cache_max_items()),
            eviction_strategy: env::var("CACHE_EVICTION_STRATEGY")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or_default(),
            sweep_interval_secs: env_parsed(
                "CACHE_SWEEP_INTERVAL_SECS",
                default_cache_sweep_interval_secs(),
            ),
        };

        let presence = PresenceConfig {
            mirror_interval_secs: env_parsed(
                "PRESENCE_MIRROR_INTERVAL_SECS",
                default_mirror_interval_secs(),
            ),
            divergence_warn_threshold: env_parsed(
                "PRESENCE_DIVERGENCE_WARN_THRESHOLD",
                default_divergence_warn_threshold(),
            ),
            heartbeat_stale_secs: env_parsed(
                "PRESENCE_HEARTBEAT_STALE_SECS",
                default_heartbeat_stale_secs(),
            ),
            reaper_interval_secs: env_parsed(
                "PRESENCE_REAPER_INTERVAL_SECS",
                default_reaper_interval_secs(),
            ),
            reaper_batch_size: env_parsed("PRESENCE_REAPER_BATCH_SIZE", default_reaper_batch_size()),
        };

        Config {
            database,
            redis,
            cache,
            presence,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
