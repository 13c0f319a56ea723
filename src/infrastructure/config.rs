use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub catalog_base_url: String,
    pub catalog_timeout: Duration,
    /// WebSocket endpoint of the realtime feed; realtime sync is off when unset
    pub realtime_url: Option<String>,
    pub realtime_collection: String,
    pub realtime_buffer: usize,
    pub realtime_resubscribe_delay: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub profile: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with_profile(None)
    }

    /// Same as `from_env`, with `profile` taking precedence over `PROFILE`.
    pub fn from_env_with_profile(profile: Option<String>) -> Self {
        let profile = profile
            .or_else(|| env::var("PROFILE").ok())
            .unwrap_or_else(|| "default".to_string());

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| profile_database_url(&profile));

        Self {
            database_url,
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            catalog_base_url: env::var("CATALOG_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000/api/v1/".to_string()),
            catalog_timeout: Duration::from_secs(
                env::var("CATALOG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            realtime_url: env::var("REALTIME_URL").ok().filter(|s| !s.is_empty()),
            realtime_collection: env::var("REALTIME_COLLECTION")
                .unwrap_or_else(|_| "books".to_string()),
            realtime_buffer: env::var("REALTIME_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(256),
            realtime_resubscribe_delay: Duration::from_millis(
                env::var("REALTIME_RESUBSCRIBE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(Vec::new),
            profile,
        }
    }
}

fn profile_database_url(profile: &str) -> String {
    if profile == "default" {
        "sqlite://bookcache.db?mode=rwc".to_string()
    } else {
        format!("sqlite://bookcache_{}.db?mode=rwc", profile)
    }
}
