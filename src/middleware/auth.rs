use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{common::error::AppError, config::AppState};

// O middleware em si: verifica o Bearer token e guarda o TenantContext na requisição
pub async fn auth_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let context = app_state.auth_service.verify_token(token)?;

    // Insere o contexto nos "extensions" da requisição
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
