// src/handlers/inventory.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::ScopeQuery,
    middleware::tenancy::TenantContext,
    models::inventory::{
        BulkStockUpdate, InventoryTransactionResult, ReservationRequest, StockMovement,
        StockTransfer,
    },
};

// ---
// Payloads e query strings
// ---
#[derive(Debug, Deserialize)]
pub struct MovementsPayload {
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Deserialize)]
pub struct BulkStockPayload {
    pub updates: Vec<BulkStockUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct ReservationsPayload {
    pub reservations: Vec<ReservationRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockQuery {
    pub threshold: Option<i32>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub variant_id: Option<i64>,
    pub limit: Option<i64>,
    pub tenant_id: Option<String>,
}

// Lote confirmado: 200. Lote desfeito: 422 com o mesmo corpo (os erros por item).
fn batch_response(result: InventoryTransactionResult) -> impl IntoResponse {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result))
}

// ---
// Handlers
// ---

pub async fn perform_stock_movements(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<MovementsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state
        .inventory_service
        .perform_stock_movements(&ctx, &payload.movements, scope.tenant_id.as_deref())
        .await?;
    Ok(batch_response(result))
}

pub async fn perform_bulk_stock_update(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<BulkStockPayload>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state
        .inventory_service
        .perform_bulk_stock_update(&ctx, &payload.updates, scope.tenant_id.as_deref())
        .await?;
    Ok(batch_response(result))
}

pub async fn transfer_stock(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<StockTransfer>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state
        .inventory_service
        .transfer_stock_between_variants(&ctx, &payload, scope.tenant_id.as_deref())
        .await?;
    Ok(batch_response(result))
}

pub async fn reserve_stock(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<ReservationsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state
        .inventory_service
        .reserve_stock(&ctx, &payload.reservations, scope.tenant_id.as_deref())
        .await?;
    Ok(batch_response(result))
}

pub async fn release_reservation(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(reservation_id): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = app_state
        .inventory_service
        .release_reservation(&ctx, &reservation_id, scope.tenant_id.as_deref())
        .await?;
    Ok(batch_response(result))
}

pub async fn get_low_stock_variants(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<LowStockQuery>,
) -> Result<impl IntoResponse, AppError> {
    let variants = app_state
        .inventory_service
        .get_low_stock_variants(&ctx, query.threshold, query.tenant_id.as_deref())
        .await?;
    Ok(Json(variants))
}

pub async fn get_stock_movement_history(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let history = app_state
        .inventory_service
        .get_stock_movement_history(&ctx, query.variant_id, query.limit, query.tenant_id.as_deref())
        .await?;
    Ok(Json(history))
}
