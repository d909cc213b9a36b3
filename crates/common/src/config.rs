use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Default dispatch schedule: every 30 seconds (seconds-resolution cron).
pub const DEFAULT_SCHEDULE: &str = "*/30 * * * * *";

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Redis connection string
    pub redis_url: String,

    /// Schedule used when the dispatcher is started without an explicit one
    pub dispatch_schedule: String,

    /// Outbound delivery endpoint
    pub webhook_url: Option<String>,

    /// Auth key sent with every outbound delivery request
    pub webhook_auth_key: Option<String>,

    /// Use the simulated transport instead of calling `webhook_url`
    pub dispatch_simulate: bool,

    /// Items selected per dispatch cycle (default: 2)
    pub dispatch_batch_size: usize,

    /// Bound on one outbound delivery call, in seconds (default: 10)
    pub dispatch_timeout_secs: u64,

    /// Bound on each store or cache call, in seconds (default: 5)
    pub store_timeout_secs: u64,

    /// Result cache time-to-live in seconds (default: 3600)
    pub cache_ttl_secs: u64,

    /// Start the dispatcher at boot (default: true)
    pub dispatch_autostart: bool,

    /// Queue the demo items at boot when the queue is empty (default: false)
    pub seed_demo_items: bool,

    /// HTTP listen port (default: 3000)
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dispatch_simulate = parse_or(&lookup, "DISPATCH_SIMULATE", false)?;
        let webhook_url = lookup("WEBHOOK_URL").filter(|v| !v.is_empty());
        if webhook_url.is_none() && !dispatch_simulate {
            anyhow::bail!("WEBHOOK_URL environment variable is required unless DISPATCH_SIMULATE=true");
        }

        let dispatch_batch_size: usize = parse_or(&lookup, "DISPATCH_BATCH_SIZE", 2)?;
        if dispatch_batch_size == 0 {
            anyhow::bail!("DISPATCH_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            dispatch_schedule: lookup("CRON_SCHEDULE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            webhook_url,
            webhook_auth_key: lookup("WEBHOOK_AUTH_KEY").filter(|v| !v.is_empty()),
            dispatch_simulate,
            dispatch_batch_size,
            dispatch_timeout_secs: parse_or(&lookup, "DISPATCH_TIMEOUT_SECS", 10)?,
            store_timeout_secs: parse_or(&lookup, "STORE_TIMEOUT_SECS", 5)?,
            cache_ttl_secs: parse_or(&lookup, "CACHE_TTL_SECS", 3600)?,
            dispatch_autostart: parse_or(&lookup, "DISPATCH_AUTOSTART", true)?,
            seed_demo_items: parse_or(&lookup, "SEED_DEMO_ITEMS", false)?,
            port: parse_or(&lookup, "PORT", 3000)?,
        })
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}
