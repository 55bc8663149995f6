//! API Handlers
//!
//! Admin endpoints over the strategy engine's core operations.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::cache::SetOptions;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, PatternDeleteResponse,
    PatternQuery, SetRequest, SetResponse, StatsResponse, TagInvalidateResponse,
};
use crate::strategy::StrategyEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StrategyEngine>,
}

impl AppState {
    pub fn new(engine: Arc<StrategyEngine>) -> Self {
        Self { engine }
    }
}

/// Handler for `PUT /keys`
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut options = SetOptions::new().tags(req.tags);
    if let Some(secs) = req.ttl {
        options = options.ttl(Duration::from_secs(secs));
    }
    state.engine.set(&req.key, &req.value, &options).await;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for `GET /keys/:key`
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .engine
        .get::<Value>(&key)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for `DELETE /keys/:key`. Deleting a missing key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let deleted = state.engine.delete(&key).await;
    Json(DeleteResponse::new(key, deleted))
}

/// Handler for `DELETE /keys?pattern=<glob>`
pub async fn delete_pattern_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<PatternDeleteResponse>> {
    let deleted = state.engine.delete_pattern(&query.pattern).await?;
    info!(pattern = %query.pattern, deleted, "Pattern invalidated via admin API");

    Ok(Json(PatternDeleteResponse {
        pattern: query.pattern,
        deleted,
    }))
}

/// Handler for `DELETE /tags/:tag`
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<TagInvalidateResponse> {
    let deleted = state.engine.invalidate_by_tag(&tag).await;
    info!(tag = %tag, deleted, "Tag invalidated via admin API");

    Json(TagInvalidateResponse { tag, deleted })
}

/// Handler for `DELETE /cache`
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.engine.clear().await;
    Json(ClearResponse::cleared())
}

/// Handler for `GET /stats`
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.engine.get_stats().await.into())
}

/// Handler for `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        state.engine.store().is_backend_connected(),
    ))
}
