use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,

    // ── Store ──────────────────────────────────────────────────────
    pub db_path: PathBuf,
    pub db_pool_size: u32,
    /// Create the database file and its tables at startup if missing.
    pub db_init: bool,

    // ── Streaming ──────────────────────────────────────────────────
    /// Inactivity before a keep-alive ping is sent.
    pub idle_timeout: Duration,
    /// Maximum records returned by one poll.
    pub batch_limit: usize,
    /// Upper bound for the client-chosen news batch size.
    pub news_max_limit: usize,
    /// Longest dense series a single response or frame may hold.
    pub max_buckets: usize,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl HubConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_str("PULSE_BIND", "127.0.0.1"),
            port: env_u16("PULSE_PORT", 8000),
            db_path: PathBuf::from(env_str("PULSE_DB", "pulse.db")),
            db_pool_size: env_u64("PULSE_DB_POOL_SIZE", 8).clamp(1, 64) as u32,
            db_init: env_bool("PULSE_DB_INIT", false),
            idle_timeout: Duration::from_secs(env_u64("PULSE_IDLE_TIMEOUT_S", 60).max(1)),
            batch_limit: env_u64("PULSE_BATCH_LIMIT", 100).max(1) as usize,
            news_max_limit: env_u64("PULSE_NEWS_MAX_LIMIT", 100).max(1) as usize,
            max_buckets: env_u64("PULSE_MAX_BUCKETS", 10_000).clamp(1, 1_000_000) as usize,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from("pulse.db"),
            db_pool_size: 8,
            db_init: false,
            idle_timeout: Duration::from_secs(60),
            batch_limit: 100,
            news_max_limit: 100,
            max_buckets: 10_000,
        }
    }
}
