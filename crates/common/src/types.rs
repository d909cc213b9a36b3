use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queued notification awaiting outbound delivery.
///
/// `delivery_id` is empty until the item is sent, and non-empty afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingItem {
    pub id: i64,
    pub content: String,
    pub destination: String,
    pub sent: bool,
    pub delivery_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingItem {
    /// Whether the `sent` flag and `delivery_id` agree.
    pub fn is_consistent(&self) -> bool {
        self.sent == !self.delivery_id.is_empty()
    }
}

/// Snapshot of a dispatched item held in the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedItem {
    pub id: i64,
    pub delivery_id: String,
    pub sent: bool,
    pub content: String,
    pub destination: String,
}

impl From<&PendingItem> for CachedItem {
    fn from(item: &PendingItem) -> Self {
        Self {
            id: item.id,
            delivery_id: item.delivery_id.clone(),
            sent: item.sent,
            content: item.content.clone(),
            destination: item.destination.clone(),
        }
    }
}

/// Operations recorded in the dispatch audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    Start,
    Stop,
    NoItems,
    ItemProcessed,
    DispatchFailed,
    StoreUpdateFailed,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditOperation::Start => write!(f, "START"),
            AuditOperation::Stop => write!(f, "STOP"),
            AuditOperation::NoItems => write!(f, "NO_ITEMS"),
            AuditOperation::ItemProcessed => write!(f, "ITEM_PROCESSED"),
            AuditOperation::DispatchFailed => write!(f, "DISPATCH_FAILED"),
            AuditOperation::StoreUpdateFailed => write!(f, "STORE_UPDATE_FAILED"),
        }
    }
}

/// A persisted audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    pub operation: AuditOperation,
    pub item_ids: Vec<i64>,
    pub item_count: i32,
    pub succeeded: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An audit entry about to be appended. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub operation: AuditOperation,
    pub item_ids: Vec<i64>,
    pub succeeded: bool,
    pub description: String,
}

impl NewAuditRecord {
    /// A control-plane record (no items attached).
    pub fn control(operation: AuditOperation, succeeded: bool, description: impl Into<String>) -> Self {
        Self {
            operation,
            item_ids: Vec::new(),
            succeeded,
            description: description.into(),
        }
    }

    /// A per-item outcome record.
    pub fn item(
        operation: AuditOperation,
        item_id: i64,
        succeeded: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            item_ids: vec![item_id],
            succeeded,
            description: description.into(),
        }
    }

    pub fn item_count(&self) -> i32 {
        self.item_ids.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sent: bool, delivery_id: &str) -> PendingItem {
        PendingItem {
            id: 7,
            content: "Your order has shipped".to_string(),
            destination: "+905551234567".to_string(),
            sent,
            delivery_id: delivery_id.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_consistency_invariant() {
        assert!(item(false, "").is_consistent());
        assert!(item(true, "MSG-1").is_consistent());
        assert!(!item(true, "").is_consistent());
        assert!(!item(false, "MSG-1").is_consistent());
    }

    #[test]
    fn test_cached_item_snapshot() {
        let snapshot = CachedItem::from(&item(true, "MSG-1"));
        assert_eq!(snapshot.id, 7);
        assert_eq!(snapshot.delivery_id, "MSG-1");
        assert!(snapshot.sent);
        assert_eq!(snapshot.destination, "+905551234567");
    }

    #[test]
    fn test_audit_operation_wire_names() {
        assert_eq!(AuditOperation::NoItems.to_string(), "NO_ITEMS");
        assert_eq!(AuditOperation::StoreUpdateFailed.to_string(), "STORE_UPDATE_FAILED");
        assert_eq!(
            serde_json::to_value(AuditOperation::ItemProcessed).unwrap(),
            serde_json::json!("ITEM_PROCESSED")
        );
    }

    #[test]
    fn test_new_audit_record_shapes() {
        let control = NewAuditRecord::control(AuditOperation::Start, true, "started");
        assert!(control.item_ids.is_empty());
        assert_eq!(control.item_count(), 0);

        let per_item = NewAuditRecord::item(AuditOperation::DispatchFailed, 42, false, "timeout");
        assert_eq!(per_item.item_ids, vec![42]);
        assert_eq!(per_item.item_count(), 1);
        assert!(!per_item.succeeded);
    }
}
