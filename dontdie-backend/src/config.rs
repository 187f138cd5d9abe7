use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

use crate::session::GameSettings;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 65536 = 64KB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "dontdie.db")
    pub database_path: String,

    /// Bucket holding reference data and the high score table
    /// Env: MAIN_BUCKET (default: "dontdie-main")
    pub main_bucket: String,

    /// Env: PLAYER_TABLE (default: "Player")
    pub player_table: String,

    /// Key prefix of the reference datasets in the main bucket
    /// Env: STATIC_DATA_PREFIX (default: "static-data/")
    pub static_data_prefix: String,

    /// Offset from UTC of the time zone designers schedule in
    /// Env: TIME_ZONE_OFFSET_HOURS (default: -8)
    pub time_zone_offset_hours: i32,

    /// Write the default reference data into the main bucket on startup
    /// Env: SEED_STATIC_DATA (default: true)
    pub seed_static_data: bool,

    /// Rate limit for /play (requests per second)
    /// Env: RATE_LIMIT_PLAY_PER_SEC (default: 20)
    pub rate_limit_play_per_sec: u64,

    /// Burst size for /play
    /// Env: RATE_LIMIT_PLAY_BURST (default: 40)
    pub rate_limit_play_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            port: env_or_default("PORT", defaults.port),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            main_bucket: env_or_default_string("MAIN_BUCKET", &defaults.main_bucket),
            player_table: env_or_default_string("PLAYER_TABLE", &defaults.player_table),
            static_data_prefix: env_or_default_string(
                "STATIC_DATA_PREFIX",
                &defaults.static_data_prefix,
            ),
            time_zone_offset_hours: env_or_default(
                "TIME_ZONE_OFFSET_HOURS",
                defaults.time_zone_offset_hours,
            ),
            seed_static_data: env_or_default("SEED_STATIC_DATA", defaults.seed_static_data),
            rate_limit_play_per_sec: env_or_default(
                "RATE_LIMIT_PLAY_PER_SEC",
                defaults.rate_limit_play_per_sec,
            ),
            rate_limit_play_burst: env_or_default(
                "RATE_LIMIT_PLAY_BURST",
                defaults.rate_limit_play_burst,
            ),
        }
    }

    /// Where game data lives, for building the game context
    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            main_bucket: self.main_bucket.clone(),
            player_table: self.player_table.clone(),
            static_data_prefix: self.static_data_prefix.clone(),
            time_zone_offset_hours: self.time_zone_offset_hours,
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            request_body_limit: 64 * 1024, // 64 KB
            request_timeout: Duration::from_secs(30),
            port: 3000,
            database_path: "dontdie.db".to_string(),
            main_bucket: "dontdie-main".to_string(),
            player_table: "Player".to_string(),
            static_data_prefix: "static-data/".to_string(),
            time_zone_offset_hours: -8,
            seed_static_data: true,
            rate_limit_play_per_sec: 20,
            rate_limit_play_burst: 40,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
