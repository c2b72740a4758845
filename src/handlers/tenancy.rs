// src/handlers/tenancy.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::tenancy::TenantContext,
    models::tenancy::{AssignUserPayload, CreateTenantPayload, Pagination, UpdateTenantPayload, UserListQuery},
};

// Rotas administrativas: o serviço recusa quem não é ADMIN

pub async fn list_tenants(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let tenants = app_state.tenant_service.list_tenants(&ctx, &pagination).await?;
    Ok(Json(tenants))
}

pub async fn create_tenant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateTenantPayload>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = app_state.tenant_service.create_tenant(&ctx, &payload).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn update_tenant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTenantPayload>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = app_state.tenant_service.update_tenant(&ctx, &id, &payload).await?;
    Ok(Json(tenant))
}

pub async fn delete_tenant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    app_state.tenant_service.delete_tenant(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = app_state.tenant_service.list_users(&ctx, &query).await?;
    Ok(Json(users))
}

pub async fn list_tenant_users(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let users = app_state.tenant_service.list_tenant_users(&ctx, &id).await?;
    Ok(Json(users))
}

pub async fn assign_user_to_tenant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<String>,
    Json(payload): Json<AssignUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = app_state
        .tenant_service
        .assign_user_to_tenant(&ctx, &id, payload.user_id)
        .await?;
    Ok(Json(user))
}

pub async fn remove_user_from_tenant(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Path((id, user_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let user = app_state
        .tenant_service
        .remove_user_from_tenant(&ctx, &id, user_id)
        .await?;
    Ok(Json(user))
}
