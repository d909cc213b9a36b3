//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::{create_pool, run_migrations};
use courier_common::redis_pool::create_redis_pool;
use courier_engine::cache::{MemoryResultCache, RedisResultCache, ResultCache};
use courier_engine::intake::IntakeService;

use courier_api::routes::create_router;
use courier_api::state::AppState;

/// How often the in-process fallback cache drops expired entries.
const MEMORY_CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    if config.seed_demo_items {
        IntakeService::seed_demo(&pool).await?;
    }

    // Redis is advisory; fall back to an in-process cache without it
    let cache: Arc<dyn ResultCache> =
        match create_redis_pool(&config.redis_url, config.store_timeout()).await {
            Ok(redis) => Arc::new(RedisResultCache::new(redis)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, using in-process result cache");
                let memory = Arc::new(MemoryResultCache::new());
                spawn_cache_purge(Arc::clone(&memory));
                memory as Arc<dyn ResultCache>
            }
        };

    // Build application state
    let state = AppState::new(pool, cache, config.clone())?;
    let controller = state.controller.clone();

    if config.dispatch_autostart {
        if let Err(e) = controller.start_default().await {
            tracing::warn!(error = %e, "Failed to start dispatcher at boot");
        }
    }

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.stop().await;
    tracing::info!("Courier API server stopped.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "courier_api=debug,courier_engine=debug,courier_notifier=info,tower_http=debug",
        )
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn spawn_cache_purge(cache: Arc<MemoryResultCache>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MEMORY_CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal, stopping gracefully...");
}
