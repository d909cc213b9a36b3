//! Dispatch pipeline — one batch cycle.
//!
//! Each cycle:
//! 1. Selects up to `batch_size` unsent items, oldest first
//! 2. Requests a self-stop when the selection is empty
//! 3. Otherwise sends, records and caches each item in selection order
//!
//! Items are independent: a failure is converted into an audit record and the
//! cycle moves on. Nothing here propagates an error to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::types::{AuditOperation, CachedItem, NewAuditRecord, PendingItem};
use courier_notifier::{DeliveryRequest, DeliveryResponse, OutboundTransport, TransportError};

use crate::audit::{self, AuditLog};
use crate::cache::{CacheError, CacheKey, ResultCache};
use crate::store::{PendingItemStore, StoreError};

/// Default number of items per cycle.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Tunables for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    /// Bound on one outbound call.
    pub dispatch_timeout: Duration,
    /// Bound on each store and cache call.
    pub store_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dispatch_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.dispatch_batch_size.max(1),
            dispatch_timeout: config.dispatch_timeout(),
            store_timeout: config.store_timeout(),
            cache_ttl: config.cache_ttl(),
        }
    }
}

/// Per-item result of a cycle, before it is folded into an audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub item_id: i64,
    pub delivery_id: Option<String>,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

/// Terminal state of one item within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Sent, marked sent in the store and (best-effort) cached.
    Processed { item_id: i64, delivery_id: String },
    /// The endpoint could not be reached or rejected the request.
    TransportFailed { item_id: i64, error: String },
    /// The endpoint answered but no delivery id could be read from it.
    ParseFailed { item_id: i64, error: String },
    /// Sent externally, but the store update failed. The item stays unsent.
    StoreFailed {
        item_id: i64,
        delivery_id: String,
        error: String,
    },
}

impl ItemOutcome {
    pub fn item_id(&self) -> i64 {
        match self {
            ItemOutcome::Processed { item_id, .. }
            | ItemOutcome::TransportFailed { item_id, .. }
            | ItemOutcome::ParseFailed { item_id, .. }
            | ItemOutcome::StoreFailed { item_id, .. } => *item_id,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, ItemOutcome::Processed { .. })
    }

    pub fn operation(&self) -> AuditOperation {
        match self {
            ItemOutcome::Processed { .. } => AuditOperation::ItemProcessed,
            ItemOutcome::TransportFailed { .. } | ItemOutcome::ParseFailed { .. } => {
                AuditOperation::DispatchFailed
            }
            ItemOutcome::StoreFailed { .. } => AuditOperation::StoreUpdateFailed,
        }
    }

    pub fn result(&self) -> DispatchResult {
        match self {
            ItemOutcome::Processed { item_id, delivery_id } => DispatchResult {
                item_id: *item_id,
                delivery_id: Some(delivery_id.clone()),
                succeeded: true,
                error_detail: None,
            },
            ItemOutcome::TransportFailed { item_id, error }
            | ItemOutcome::ParseFailed { item_id, error } => DispatchResult {
                item_id: *item_id,
                delivery_id: None,
                succeeded: false,
                error_detail: Some(error.clone()),
            },
            ItemOutcome::StoreFailed {
                item_id,
                delivery_id,
                error,
            } => DispatchResult {
                item_id: *item_id,
                delivery_id: Some(delivery_id.clone()),
                succeeded: false,
                error_detail: Some(error.clone()),
            },
        }
    }

    fn description(&self) -> String {
        match self {
            ItemOutcome::Processed { delivery_id, .. } => {
                format!("Item processed successfully with delivery id: {}", delivery_id)
            }
            ItemOutcome::TransportFailed { error, .. } => format!("Request failed: {}", error),
            ItemOutcome::ParseFailed { error, .. } => format!("Response decode failed: {}", error),
            ItemOutcome::StoreFailed {
                delivery_id, error, ..
            } => format!(
                "Store update failed after delivery {}: {}",
                delivery_id, error
            ),
        }
    }

    pub fn audit_record(&self) -> NewAuditRecord {
        NewAuditRecord::item(
            self.operation(),
            self.item_id(),
            self.succeeded(),
            self.description(),
        )
    }
}

/// What the scheduler should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    Continue,
    /// The queue was confirmed empty; stop scheduling further cycles.
    SelfStop,
}

/// Ordered outcomes of one cycle plus the batch-level decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcomes: Vec<ItemOutcome>,
    pub decision: CycleDecision,
}

impl CycleReport {
    fn idle(decision: CycleDecision) -> Self {
        Self {
            outcomes: Vec::new(),
            decision,
        }
    }

    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.processed()
    }
}

/// Executes batch cycles against the store, transport, cache and audit log.
pub struct DispatchPipeline {
    store: Arc<dyn PendingItemStore>,
    cache: Arc<dyn ResultCache>,
    transport: Arc<dyn OutboundTransport>,
    audit: Arc<dyn AuditLog>,
    settings: PipelineSettings,
}

impl DispatchPipeline {
    pub fn new(
        store: Arc<dyn PendingItemStore>,
        cache: Arc<dyn ResultCache>,
        transport: Arc<dyn OutboundTransport>,
        audit: Arc<dyn AuditLog>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            cache,
            transport,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Append an audit record, bounded by the store timeout.
    pub async fn record(&self, record: NewAuditRecord) {
        audit::append_within(self.audit.as_ref(), record, self.settings.store_timeout).await;
    }

    /// Run exactly one cycle to completion.
    pub async fn run_cycle(&self) -> CycleReport {
        let batch_size = self.settings.batch_size.max(1);
        let selection = bounded(
            self.settings.store_timeout,
            self.store.select_oldest_unsent(batch_size),
            StoreError::Timeout,
        )
        .await;

        let items = match selection {
            Ok(items) => items,
            Err(e) => {
                // Unknown queue state: keep the schedule alive and retry next cycle.
                tracing::error!(error = %e, "Failed to select pending items");
                return CycleReport::idle(CycleDecision::Continue);
            }
        };

        if items.is_empty() {
            tracing::info!("No pending items found");
            self.record(NewAuditRecord::control(
                AuditOperation::NoItems,
                true,
                "No pending items found, stopping dispatcher",
            ))
            .await;
            return CycleReport::idle(CycleDecision::SelfStop);
        }

        tracing::info!(count = items.len(), transport = self.transport.name(), "Processing batch");

        let mut outcomes = Vec::with_capacity(items.len());
        for item in &items {
            let outcome = self.process_item(item).await;
            self.record(outcome.audit_record()).await;
            outcomes.push(outcome);
        }

        let report = CycleReport {
            outcomes,
            decision: CycleDecision::Continue,
        };
        tracing::info!(
            processed = report.processed(),
            failed = report.failed(),
            "Batch cycle complete"
        );
        report
    }

    async fn process_item(&self, item: &PendingItem) -> ItemOutcome {
        let item_id = item.id;
        tracing::debug!(item_id, "Processing item");

        let request = DeliveryRequest::new(item_id, &item.destination, &item.content);

        let body = match bounded(
            self.settings.dispatch_timeout,
            self.transport.send(&request),
            TransportError::Timeout,
        )
        .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(item_id, error = %e, "Delivery request failed");
                return ItemOutcome::TransportFailed {
                    item_id,
                    error: e.to_string(),
                };
            }
        };

        let delivery_id = match DeliveryResponse::parse(&body) {
            Ok(response) => response.message_id,
            Err(e) => {
                tracing::error!(item_id, error = %e, body = %body, "Failed to decode delivery response");
                return ItemOutcome::ParseFailed {
                    item_id,
                    error: e.to_string(),
                };
            }
        };

        if let Err(e) = bounded(
            self.settings.store_timeout,
            self.store.mark_sent(item_id, &delivery_id),
            StoreError::Timeout,
        )
        .await
        {
            tracing::error!(
                item_id,
                delivery_id = %delivery_id,
                error = %e,
                "Delivered but failed to mark item sent"
            );
            return ItemOutcome::StoreFailed {
                item_id,
                delivery_id,
                error: e.to_string(),
            };
        }

        let snapshot = CachedItem {
            id: item_id,
            delivery_id: delivery_id.clone(),
            sent: true,
            content: item.content.clone(),
            destination: item.destination.clone(),
        };
        self.cache_snapshot(&snapshot).await;

        tracing::info!(item_id, delivery_id = %delivery_id, "Item delivered");
        ItemOutcome::Processed {
            item_id,
            delivery_id,
        }
    }

    /// Best-effort: failures are logged and never change the item's outcome.
    async fn cache_snapshot(&self, snapshot: &CachedItem) {
        for key in [CacheKey::Item(snapshot.id), CacheKey::Latest] {
            let result = bounded(
                self.settings.store_timeout,
                self.cache.put(key, snapshot, self.settings.cache_ttl),
                CacheError::Timeout,
            )
            .await;

            if let Err(e) = result {
                tracing::warn!(
                    item_id = snapshot.id,
                    key = %key,
                    cache = self.cache.name(),
                    error = %e,
                    "Failed to cache dispatch result"
                );
            }
        }
    }
}

/// Run `fut` with a time bound, mapping elapsed time into the call's error type.
async fn bounded<T, E, F>(limit: Duration, fut: F, on_timeout: fn(Duration) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_operations() {
        let processed = ItemOutcome::Processed {
            item_id: 1,
            delivery_id: "D1".into(),
        };
        let transport = ItemOutcome::TransportFailed {
            item_id: 2,
            error: "connection refused".into(),
        };
        let parse = ItemOutcome::ParseFailed {
            item_id: 3,
            error: "missing messageId".into(),
        };
        let store = ItemOutcome::StoreFailed {
            item_id: 4,
            delivery_id: "D4".into(),
            error: "timed out".into(),
        };

        assert_eq!(processed.operation(), AuditOperation::ItemProcessed);
        assert_eq!(transport.operation(), AuditOperation::DispatchFailed);
        assert_eq!(parse.operation(), AuditOperation::DispatchFailed);
        assert_eq!(store.operation(), AuditOperation::StoreUpdateFailed);

        assert!(processed.succeeded());
        assert!(!store.succeeded());
        assert_eq!(store.item_id(), 4);
    }

    #[test]
    fn test_dispatch_result_shapes() {
        let result = ItemOutcome::StoreFailed {
            item_id: 4,
            delivery_id: "D4".into(),
            error: "timed out".into(),
        }
        .result();
        assert_eq!(result.delivery_id.as_deref(), Some("D4"));
        assert!(!result.succeeded);
        assert_eq!(result.error_detail.as_deref(), Some("timed out"));

        let result = ItemOutcome::Processed {
            item_id: 1,
            delivery_id: "D1".into(),
        }
        .result();
        assert!(result.succeeded);
        assert!(result.error_detail.is_none());
    }

    #[test]
    fn test_audit_record_from_outcome() {
        let record = ItemOutcome::ParseFailed {
            item_id: 3,
            error: "missing messageId".into(),
        }
        .audit_record();
        assert_eq!(record.operation, AuditOperation::DispatchFailed);
        assert_eq!(record.item_ids, vec![3]);
        assert!(!record.succeeded);
        assert!(record.description.contains("missing messageId"));
    }

    #[test]
    fn test_settings_from_config_clamps_batch_size() {
        let mut config = AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://x".into()),
            "DISPATCH_SIMULATE" => Some("true".into()),
            _ => None,
        })
        .unwrap();
        config.dispatch_batch_size = 0;

        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.dispatch_timeout, Duration::from_secs(10));
    }
}
