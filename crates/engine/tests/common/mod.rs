//! In-memory collaborators for exercising the pipeline and controller
//! without Postgres, Redis or a network endpoint.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use courier_common::error::AppError;
use courier_common::types::{
    AuditOperation, AuditRecord, CachedItem, NewAuditRecord, PendingItem,
};
use courier_engine::audit::{AuditLog, clamp_limit};
use courier_engine::cache::{CacheError, CacheKey, MemoryResultCache, ResultCache};
use courier_engine::pipeline::{DispatchPipeline, PipelineSettings};
use courier_engine::store::{PendingItemStore, StoreError};
use courier_notifier::{DeliveryRequest, OutboundTransport, TransportError};

pub fn created_at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

pub fn item(id: i64, offset_secs: i64) -> PendingItem {
    PendingItem {
        id,
        content: format!("Notification #{}", id),
        destination: format!("+90555123{:04}", id),
        sent: false,
        delivery_id: String::new(),
        created_at: created_at(offset_secs),
        updated_at: created_at(offset_secs),
    }
}

// ============================================================
// Store
// ============================================================

#[derive(Default)]
pub struct FakeStore {
    items: Mutex<Vec<PendingItem>>,
    fail_mark_sent: Mutex<HashSet<i64>>,
    fail_select: AtomicBool,
    select_delay: Mutex<Option<Duration>>,
    pub select_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with_items(items: Vec<PendingItem>) -> Arc<Self> {
        let store = Self::default();
        *store.items.lock().unwrap() = items;
        Arc::new(store)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, id: i64) -> PendingItem {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .unwrap()
    }

    pub fn push(&self, item: PendingItem) {
        self.items.lock().unwrap().push(item);
    }

    pub fn fail_mark_sent_for(&self, id: i64) {
        self.fail_mark_sent.lock().unwrap().insert(id);
    }

    pub fn fail_selects(&self) {
        self.fail_select.store(true, Ordering::SeqCst);
    }

    pub fn delay_selects(&self, delay: Duration) {
        *self.select_delay.lock().unwrap() = Some(delay);
    }

    pub fn unsent_ids(&self) -> Vec<i64> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| !i.sent)
            .map(|i| i.id)
            .collect()
    }
}

#[async_trait]
impl PendingItemStore for FakeStore {
    async fn select_oldest_unsent(&self, limit: usize) -> Result<Vec<PendingItem>, StoreError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.select_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut unsent: Vec<PendingItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| !i.sent)
            .cloned()
            .collect();
        unsent.sort_by_key(|i| (i.created_at, i.id));
        unsent.truncate(limit);
        Ok(unsent)
    }

    async fn mark_sent(&self, id: i64, delivery_id: &str) -> Result<(), StoreError> {
        if self.fail_mark_sent.lock().unwrap().contains(&id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| i.id == id && !i.sent) {
            Some(item) => {
                item.sent = true;
                item.delivery_id = delivery_id.to_string();
                Ok(())
            }
            None => Err(StoreError::NotUpdated(id)),
        }
    }
}

// ============================================================
// Transport
// ============================================================

#[derive(Default)]
pub struct FakeTransport {
    fail_ids: Mutex<HashSet<i64>>,
    garbage_ids: Mutex<HashSet<i64>>,
    delay: Mutex<Option<Duration>>,
    pub sent: Mutex<Vec<i64>>,
    pub calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, id: i64) {
        self.fail_ids.lock().unwrap().insert(id);
    }

    pub fn garbage_for(&self, id: i64) {
        self.garbage_ids.lock().unwrap().insert(id);
    }

    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl OutboundTransport for FakeTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<String, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_ids.lock().unwrap().contains(&request.item_id) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        if self.garbage_ids.lock().unwrap().contains(&request.item_id) {
            return Ok("<html>accepted</html>".to_string());
        }
        self.sent.lock().unwrap().push(request.item_id);
        Ok(format!(
            r#"{{"message":"Accepted","messageId":"DLV-{}-{}"}}"#,
            request.item_id, n
        ))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// ============================================================
// Cache
// ============================================================

pub struct FailingCache;

#[async_trait]
impl ResultCache for FailingCache {
    async fn put(&self, _key: CacheKey, _snapshot: &CachedItem, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Timeout(Duration::from_secs(5)))
    }

    async fn get(&self, _key: CacheKey) -> Result<Option<CachedItem>, CacheError> {
        Err(CacheError::Timeout(Duration::from_secs(5)))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

// ============================================================
// Audit
// ============================================================

#[derive(Default)]
pub struct FakeAudit {
    records: Mutex<Vec<NewAuditRecord>>,
}

impl FakeAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<NewAuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<AuditOperation> {
        self.records().iter().map(|r| r.operation).collect()
    }
}

#[async_trait]
impl AuditLog for FakeAudit {
    async fn append(&self, record: NewAuditRecord) {
        self.records.lock().unwrap().push(record);
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let records = self.records();
        Ok(records
            .iter()
            .enumerate()
            .rev()
            .take(clamp_limit(limit) as usize)
            .map(|(i, r)| AuditRecord {
                id: i as i64 + 1,
                operation: r.operation,
                item_ids: r.item_ids.clone(),
                item_count: r.item_count(),
                succeeded: r.succeeded,
                description: r.description.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }
}

/// An audit log whose appends never complete.
pub struct StalledAudit;

#[async_trait]
impl AuditLog for StalledAudit {
    async fn append(&self, _record: NewAuditRecord) {
        std::future::pending::<()>().await;
    }

    async fn recent(&self, _limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        Ok(Vec::new())
    }
}

// ============================================================
// Wiring
// ============================================================

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub transport: Arc<FakeTransport>,
    pub cache: Arc<MemoryResultCache>,
    pub audit: Arc<FakeAudit>,
}

impl Harness {
    pub fn new(items: Vec<PendingItem>) -> Self {
        Self {
            store: FakeStore::with_items(items),
            transport: FakeTransport::new(),
            cache: Arc::new(MemoryResultCache::new()),
            audit: FakeAudit::new(),
        }
    }

    pub fn pipeline(&self, batch_size: usize) -> DispatchPipeline {
        self.pipeline_with_cache(batch_size, self.cache.clone())
    }

    pub fn pipeline_with_cache(&self, batch_size: usize, cache: Arc<dyn ResultCache>) -> DispatchPipeline {
        self.build(batch_size, cache, self.audit.clone())
    }

    pub fn pipeline_with_audit(&self, batch_size: usize, audit: Arc<dyn AuditLog>) -> DispatchPipeline {
        self.build(batch_size, self.cache.clone(), audit)
    }

    fn build(&self, batch_size: usize, cache: Arc<dyn ResultCache>, audit: Arc<dyn AuditLog>) -> DispatchPipeline {
        DispatchPipeline::new(
            self.store.clone(),
            cache,
            self.transport.clone(),
            audit,
            PipelineSettings {
                batch_size,
                ..PipelineSettings::default()
            },
        )
    }
}
