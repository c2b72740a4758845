// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::ScopeQuery,
    middleware::tenancy::TenantContext,
    models::catalog::{
        CreateProductPayload, CreateVariantPayload, ProductQuery, StockAdjustmentPayload,
        UpdateProductPayload, UpdateVariantPayload,
    },
};

// ---
// Produtos
// ---

pub async fn list_products(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, AppError> {
    let products = app_state.catalog_service.list_products(&ctx, &query).await?;
    Ok(Json(products))
}

pub async fn create_product(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateProductPayload>,
) -> Result<impl IntoResponse, AppError> {
    let product = app_state.catalog_service.create_product(&ctx, &payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let product = app_state
        .catalog_service
        .get_product(&ctx, id, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(product))
}

pub async fn update_product(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<UpdateProductPayload>,
) -> Result<impl IntoResponse, AppError> {
    let product = app_state
        .catalog_service
        .update_product(&ctx, id, &payload, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .catalog_service
        .delete_product(&ctx, id, scope.tenant_id.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn catalog_stats(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let stats = app_state
        .catalog_service
        .catalog_stats(&ctx, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(stats))
}

// ---
// Variantes
// ---

pub async fn list_variants(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(product_id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let variants = app_state
        .catalog_service
        .list_variants(&ctx, product_id, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(variants))
}

pub async fn create_variant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(product_id): Path<i64>,
    Json(payload): Json<CreateVariantPayload>,
) -> Result<impl IntoResponse, AppError> {
    let variant = app_state
        .catalog_service
        .create_variant(&ctx, product_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

// O "bip" do leitor de código de barras
pub async fn get_variant_by_barcode(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(barcode): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let variant = app_state
        .catalog_service
        .get_variant_by_barcode(&ctx, &barcode, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(variant))
}

pub async fn update_variant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<UpdateVariantPayload>,
) -> Result<impl IntoResponse, AppError> {
    let variant = app_state
        .catalog_service
        .update_variant(&ctx, id, &payload, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(variant))
}

pub async fn delete_variant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .catalog_service
        .delete_variant(&ctx, id, scope.tenant_id.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Ajuste pontual: passa pelo motor de estoque, não pelo catálogo
pub async fn adjust_variant_stock(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
    Json(payload): Json<StockAdjustmentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let variant = app_state
        .inventory_service
        .adjust_variant_stock(&ctx, id, payload.stock_change, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(variant))
}
