//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_engine::audit::PgAuditLog;
use courier_engine::cache::ResultCache;
use courier_engine::controller::JobController;
use courier_engine::pipeline::{DispatchPipeline, PipelineSettings};
use courier_engine::store::PgItemStore;
use courier_notifier::{OutboundTransport, SimulatedTransport, WebhookTransport};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: Arc<dyn ResultCache>,
    pub controller: JobController,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the dispatch pipeline and controller around a pool and cache.
    pub fn new(pool: PgPool, cache: Arc<dyn ResultCache>, config: AppConfig) -> anyhow::Result<Self> {
        let transport = build_transport(&config)?;
        tracing::info!(transport = transport.name(), cache = cache.name(), "Dispatch collaborators ready");

        let pipeline = DispatchPipeline::new(
            Arc::new(PgItemStore::new(pool.clone())),
            cache.clone(),
            transport,
            Arc::new(PgAuditLog::new(pool.clone())),
            PipelineSettings::from(&config),
        );
        let controller = JobController::new(pipeline, config.dispatch_schedule.clone());

        Ok(Self {
            pool,
            cache,
            controller,
            config,
        })
    }
}

fn build_transport(config: &AppConfig) -> anyhow::Result<Arc<dyn OutboundTransport>> {
    if config.dispatch_simulate {
        return Ok(Arc::new(SimulatedTransport::new()));
    }

    let url = config
        .webhook_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("WEBHOOK_URL is required unless DISPATCH_SIMULATE=true"))?;
    let transport = WebhookTransport::new(
        url,
        config.webhook_auth_key.clone(),
        config.dispatch_timeout(),
    )?;
    Ok(Arc::new(transport))
}
