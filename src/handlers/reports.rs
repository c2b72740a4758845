// src/handlers/reports.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    common::error::AppError, config::AppState, middleware::tenancy::TenantContext,
    models::report::SalesReportQuery,
};

// GET /api/admin/reports/sales?tenantId=&startDate=&endDate=&groupBy=day|week|month
pub async fn sales_report(
    State(app_state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<SalesReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state.report_service.sales_report(&ctx, &query).await?;
    Ok(Json(report))
}
