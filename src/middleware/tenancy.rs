// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{common::error::AppError, models::auth::Role};

// ---
// Scope: o filtro de tenant efetivamente aplicado a uma consulta
// ---
// "Sem filtro" e "filtrar pela loja X" nunca se confundem com uma string vazia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Unscoped,
    ScopedTo(String),
}

impl Scope {
    /// Valor para os binds `($n::text IS NULL OR tenant_id = $n)`.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Scope::Unscoped => None,
            Scope::ScopedTo(tenant_id) => Some(tenant_id),
        }
    }

    pub fn allows(&self, tenant_id: &str) -> bool {
        match self {
            Scope::Unscoped => true,
            Scope::ScopedTo(scoped) => scoped == tenant_id,
        }
    }
}

// ---
// TenantContext: o "token de capacidade" de cada requisição
// ---
// Construído uma vez a partir da identidade verificada e nunca alterado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    user_id: i64,
    role: Role,
    tenant_id: Option<String>,
}

impl TenantContext {
    pub fn new(user_id: i64, role: Role, tenant_id: Option<String>) -> Self {
        Self { user_id, role, tenant_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Valida o escopo pedido contra o contexto. ADMIN nunca falha aqui.
    pub fn validate_access(&self, requested: Option<&str>) -> Result<(), AppError> {
        if self.role == Role::Seller {
            let own = self.tenant_id.as_deref().ok_or(AppError::SellerUnassigned)?;
            if let Some(requested) = normalize(requested) {
                if requested != own {
                    return Err(AppError::CrossTenantAccessDenied);
                }
            }
        }
        Ok(())
    }

    /// Escopo efetivo: SELLER sempre na própria loja; ADMIN no pedido ou sem filtro.
    pub fn effective_scope(&self, requested: Option<&str>) -> Result<Scope, AppError> {
        match self.role {
            Role::Seller => self
                .tenant_id
                .clone()
                .map(Scope::ScopedTo)
                .ok_or(AppError::SellerUnassigned),
            Role::Admin => Ok(normalize(requested)
                .map(|t| Scope::ScopedTo(t.to_string()))
                .unwrap_or(Scope::Unscoped)),
        }
    }

    /// Validação seguida da resolução. Todo serviço passa por aqui antes do banco.
    pub fn authorize(&self, requested: Option<&str>) -> Result<Scope, AppError> {
        self.validate_access(requested)?;
        self.effective_scope(requested)
    }

    /// Loja concreta para operações de criação (produto, variante, nota).
    pub fn require_tenant(&self, requested: Option<&str>) -> Result<String, AppError> {
        match self.authorize(requested)? {
            Scope::ScopedTo(tenant_id) => Ok(tenant_id),
            Scope::Unscoped => Err(AppError::ValidationFailed(
                crate::common::validation::single_field_error(
                    "tenantId",
                    "required",
                    "O campo 'tenantId' é obrigatório para administradores.",
                ),
            )),
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role != Role::Admin {
            return Err(AppError::AdminRequired);
        }
        Ok(())
    }

    /// Restrição extra das notas: vendedor só vê as próprias.
    pub fn invoice_owner_filter(&self, requested_user_id: Option<i64>) -> Option<i64> {
        match self.role {
            Role::Seller => Some(self.user_id),
            Role::Admin => requested_user_id,
        }
    }
}

fn normalize(requested: Option<&str>) -> Option<&str> {
    requested.map(str::trim).filter(|t| !t.is_empty())
}

// Extrator: o `auth_guard` coloca o contexto nas extensions da requisição.
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}
