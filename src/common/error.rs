// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Taxonomia de erros do núcleo. O HTTP só traduz o tipo para uma classe de status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Autenticação necessária")]
    Unauthenticated,

    #[error("O vendedor precisa estar vinculado a uma loja")]
    SellerUnassigned,

    #[error("Acesso negado: não é possível acessar dados de outra loja")]
    CrossTenantAccessDenied,

    #[error("Privilégios de administrador necessários")]
    AdminRequired,

    // "Não existe" e "existe mas não é seu" são propositalmente o mesmo erro
    #[error("{0} não encontrado(a) ou acesso negado")]
    NotFoundOrDenied(&'static str),

    #[error("Erro de validação")]
    ValidationFailed(#[from] validator::ValidationErrors),

    #[error("Variante {variant_id} não encontrada")]
    VariantNotFound { variant_id: i64 },

    #[error("Estoque insuficiente para a variante {variant_id}. Disponível: {available}, solicitado: {requested}")]
    InsufficientStock {
        variant_id: i64,
        available: i32,
        requested: i32,
    },

    #[error("O código de barras '{0}' já existe no sistema")]
    DuplicateBarcode(String),

    #[error("Já existe uma loja com o nome '{0}'")]
    DuplicateTenantName(String),

    #[error("Não é possível excluir uma loja com usuários, produtos ou notas")]
    DependentDataExists,

    #[error("{entity} {id} já foi usado(a) em notas e não pode ser excluído(a)")]
    ReferencedByInvoices { entity: &'static str, id: i64 },

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::SellerUnassigned
            | AppError::CrossTenantAccessDenied
            | AppError::AdminRequired => StatusCode::FORBIDDEN,
            AppError::NotFoundOrDenied(_) | AppError::VariantNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            AppError::DuplicateBarcode(_)
            | AppError::DuplicateTenantName(_)
            | AppError::DependentDataExists
            | AppError::ReferencedByInvoices { .. } => StatusCode::CONFLICT,
            AppError::ValidationFailed(_) | AppError::InsufficientStock { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            // Retorna todos os campos inválidos, não só o primeiro.
            AppError::ValidationFailed(errors) => {
                let mut details = std::collections::BTreeMap::new();
                collect_messages("", errors, &mut details);
                json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                })
            }
            AppError::InsufficientStock { variant_id, available, requested } => json!({
                "error": self.to_string(),
                "details": {
                    "variantId": variant_id,
                    "available": available,
                    "requested": requested,
                },
            }),
            AppError::JwtError(e) => {
                tracing::debug!("Token rejeitado: {}", e);
                json!({ "error": "Token de autenticação inválido ou ausente." })
            }
            // Erros internos nunca expõem detalhes ao chamador.
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                tracing::error!("Erro Interno do Servidor: {:?}", self);
                json!({ "error": "Ocorreu um erro inesperado." })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

// Achata erros aninhados (ex.: `items[1].quantity`) num mapa campo -> mensagens
fn collect_messages(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut std::collections::BTreeMap<String, Vec<String>>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                out.insert(path, messages);
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}
