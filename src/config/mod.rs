/// Application configuration module
use anyhow::Context;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub satchecker: SatCheckerConfig,
    pub batch_concurrency: usize,
}

/// Remote ephemeris service settings
#[derive(Clone, Debug)]
pub struct SatCheckerConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SatCheckerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://satchecker.cps.iau.org".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is required")?;

        let defaults = SatCheckerConfig::default();
        let base_url = env::var("SATCHECKER_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let timeout = satchecker_timeout(env_u64("SATCHECKER_TIMEOUT_SECONDS", 10));

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        // 1 keeps rows strictly sequential
        let batch_concurrency = env_u64("BATCH_CONCURRENCY", 4).max(1) as usize;

        Ok(Self {
            database_url,
            db_max_connections: env_u64("DB_MAX_CONNECTIONS", 5).clamp(1, u32::MAX as u64) as u32,
            bind_addr,
            satchecker: SatCheckerConfig { base_url, timeout },
            batch_concurrency,
        })
    }
}

/// Per-call timeout; zero would fail every call immediately
fn satchecker_timeout(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_u64_falls_back_on_garbage() {
        env::set_var("SCORE_TEST_ENV_U64", "not-a-number");
        assert_eq!(env_u64("SCORE_TEST_ENV_U64", 7), 7);
        env::set_var("SCORE_TEST_ENV_U64", "12");
        assert_eq!(env_u64("SCORE_TEST_ENV_U64", 7), 12);
    }

    #[test]
    fn test_satchecker_timeout_has_a_floor() {
        assert_eq!(satchecker_timeout(0), Duration::from_secs(1));
        assert_eq!(satchecker_timeout(10), Duration::from_secs(10));
    }

    #[test]
    fn test_satchecker_default_timeout_is_ten_seconds() {
        assert_eq!(SatCheckerConfig::default().timeout, Duration::from_secs(10));
    }
}
