//! Item intake and read-back routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use courier_common::error::AppError;
use courier_common::types::{CachedItem, PendingItem};
use courier_engine::cache::{CacheKey, read_through};
use courier_engine::intake::{CreateItemParams, IntakeService};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", get(list_sent).post(create_item))
        .route("/api/messages/latest", get(latest_sent))
        .route("/api/messages/{id}", get(get_item))
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub status: &'static str,
    pub data: PendingItem,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub status: &'static str,
    pub data: Vec<PendingItem>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub status: &'static str,
    /// `cache` or `store`
    pub source: &'static str,
    pub data: CachedItem,
}

/// POST /api/messages — Queue a new item for dispatch.
async fn create_item(
    State(state): State<AppState>,
    Json(params): Json<CreateItemParams>,
) -> Result<(StatusCode, Json<ItemResponse>), AppError> {
    let item = IntakeService::create(&state.pool, &params).await?;
    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            status: "success",
            data: item,
        }),
    ))
}

/// GET /api/messages — All sent items.
async fn list_sent(State(state): State<AppState>) -> Result<Json<ItemsResponse>, AppError> {
    let items = IntakeService::list_sent(&state.pool).await?;
    Ok(Json(ItemsResponse {
        status: "success",
        data: items,
    }))
}

/// GET /api/messages/latest — The most recently dispatched item, from the cache.
async fn latest_sent(State(state): State<AppState>) -> Result<Json<SnapshotResponse>, AppError> {
    let snapshot = read_through(
        state.cache.as_ref(),
        CacheKey::Latest,
        state.config.store_timeout(),
    )
    .await
    .ok_or_else(|| AppError::NotFound("No recently dispatched item".to_string()))?;

    Ok(Json(SnapshotResponse {
        status: "success",
        source: "cache",
        data: snapshot,
    }))
}

/// GET /api/messages/:id — Cache first, store on miss.
async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SnapshotResponse>, AppError> {
    if let Some(snapshot) =
        read_through(state.cache.as_ref(), CacheKey::Item(id), state.config.store_timeout()).await
    {
        return Ok(Json(SnapshotResponse {
            status: "success",
            source: "cache",
            data: snapshot,
        }));
    }

    let item = IntakeService::get(&state.pool, id).await?;
    Ok(Json(SnapshotResponse {
        status: "success",
        source: "store",
        data: CachedItem::from(&item),
    }))
}
