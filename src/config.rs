use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::db::Isolation;

const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    /// Path to a `public_suffix_list.dat` style file.
    pub public_suffix_list: Option<String>,
    pub isolation: Isolation,
    /// Deadline applied to each counting call, if set.
    pub query_timeout: Option<Duration>,
    pub pool_size: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let isolation = match env::var("ISOLATION") {
            Ok(v) => Isolation::from_str(&v).unwrap_or_else(|_| {
                tracing::warn!("Unknown ISOLATION '{}', using best_effort", v);
                Isolation::BestEffort
            }),
            Err(_) => Isolation::default(),
        };

        let query_timeout = env::var("QUERY_TIMEOUT_MS")
            .ok()
            .and_then(|v| parse_query_timeout(&v));

        let pool_size = env::var("DB_POOL_SIZE")
            .map(|v| parse_pool_size(&v))
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "issuance_limits.db".to_string()),
            public_suffix_list: env::var("PUBLIC_SUFFIX_LIST").ok(),
            isolation,
            query_timeout,
            pool_size,
        }
    }
}

/// Milliseconds, zero or garbage meaning no deadline.
fn parse_query_timeout(value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!("Invalid QUERY_TIMEOUT_MS '{}', running without a deadline", value);
            None
        }
    }
}

fn parse_pool_size(value: &str) -> u32 {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::warn!("Invalid DB_POOL_SIZE '{}', using {}", value, DEFAULT_POOL_SIZE);
            DEFAULT_POOL_SIZE
        }
    }
}
