use std::time::Duration;

use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager for async operations.
///
/// The initial connection attempt is bounded by `connect_timeout` so a missing
/// Redis does not stall startup.
pub async fn create_redis_pool(
    redis_url: &str,
    connect_timeout: Duration,
) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to Redis at {}", redis_url))??;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
