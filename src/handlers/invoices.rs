// src/handlers/invoices.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::ScopeQuery,
    middleware::tenancy::TenantContext,
    models::invoice::{CreateInvoicePayload, InvoiceQuery},
};

pub async fn create_invoice(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateInvoicePayload>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = app_state.invoice_service.create_invoice(&ctx, &payload).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoices(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<InvoiceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let invoices = app_state.invoice_service.get_invoices(&ctx, &query).await?;
    Ok(Json(invoices))
}

pub async fn get_invoices_count(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<InvoiceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let count = app_state.invoice_service.get_invoices_count(&ctx, &query).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn get_invoice_by_id(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<i64>,
    Query(scope): Query<ScopeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = app_state
        .invoice_service
        .get_invoice_by_id(&ctx, id, scope.tenant_id.as_deref())
        .await?;
    Ok(Json(invoice))
}
