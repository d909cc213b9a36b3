//! Intake service — queueing new items and reading them back.

use std::sync::LazyLock;

use regex::Regex;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::PendingItem;

/// Maximum content length, in characters.
pub const MAX_CONTENT_CHARS: usize = 120;

/// Maximum destination length, including a leading `+`.
pub const MAX_DESTINATION_CHARS: usize = 15;

static DESTINATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("destination pattern is valid"));

/// Items queued by [`IntakeService::seed_demo`].
pub const DEMO_ITEMS: [(&str, &str); 5] = [
    ("Hello! How can I help you?", "+905551234567"),
    ("Good day, your order is being prepared.", "+905551234568"),
    ("Your order has been shipped, it will arrive soon.", "+905551234569"),
    ("Would you like to be informed about our campaigns?", "+905551234570"),
    ("Update your profile for exclusive discount opportunities.", "+905551234571"),
];

/// Service layer for pending-item intake and read-back.
pub struct IntakeService;

/// Parameters for queueing a new item.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateItemParams {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "phone")]
    pub destination: String,
}

impl IntakeService {
    /// Check a request before it touches the database.
    pub fn validate(params: &CreateItemParams) -> Result<(), AppError> {
        if params.content.trim().is_empty() {
            return Err(AppError::Validation("Content field is required".to_string()));
        }
        if params.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::Validation(format!(
                "Content field cannot exceed {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        if params.destination.is_empty() {
            return Err(AppError::Validation("Destination field is required".to_string()));
        }
        if params.destination.chars().count() > MAX_DESTINATION_CHARS {
            return Err(AppError::Validation(format!(
                "Destination cannot exceed {} characters",
                MAX_DESTINATION_CHARS
            )));
        }
        if !DESTINATION_PATTERN.is_match(&params.destination) {
            return Err(AppError::Validation(
                "Invalid destination format. Example: +905551234567 or 5551234567".to_string(),
            ));
        }
        Ok(())
    }

    /// Queue a new unsent item.
    pub async fn create(pool: &PgPool, params: &CreateItemParams) -> Result<PendingItem, AppError> {
        Self::validate(params)?;

        let item: PendingItem = sqlx::query_as(
            r#"
            INSERT INTO pending_items (content, destination)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(&params.content)
        .bind(&params.destination)
        .fetch_one(pool)
        .await?;

        tracing::info!(item_id = item.id, "Item queued for dispatch");
        Ok(item)
    }

    /// All sent items, most recently updated first.
    pub async fn list_sent(pool: &PgPool) -> Result<Vec<PendingItem>, AppError> {
        let items: Vec<PendingItem> = sqlx::query_as(
            "SELECT * FROM pending_items WHERE sent = true ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await?;

        Ok(items)
    }

    /// Queue [`DEMO_ITEMS`] if the table holds no items yet. Returns how many
    /// were inserted.
    pub async fn seed_demo(pool: &PgPool) -> Result<usize, AppError> {
        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_items")
            .fetch_one(pool)
            .await?;
        if existing > 0 {
            tracing::debug!(existing, "Queue not empty, skipping demo seed");
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for (content, destination) in DEMO_ITEMS {
            sqlx::query("INSERT INTO pending_items (content, destination) VALUES ($1, $2)")
                .bind(content)
                .bind(destination)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(count = DEMO_ITEMS.len(), "Seeded demo items");
        Ok(DEMO_ITEMS.len())
    }

    /// A single item by id.
    pub async fn get(pool: &PgPool, id: i64) -> Result<PendingItem, AppError> {
        let item: PendingItem = sqlx::query_as("SELECT * FROM pending_items WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;

        Ok(item)
    }
}
