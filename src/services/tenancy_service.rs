// src/services/tenancy_service.rs

use std::sync::Arc;

use validator::Validate;

use crate::{
    common::{
        error::AppError,
        validation::{normalize_optional, single_field_error},
    },
    db::{
        Store,
        repository::{NewTenant, TenantChanges},
    },
    middleware::tenancy::TenantContext,
    models::{
        auth::{Role, User},
        tenancy::{CreateTenantPayload, Pagination, Tenant, TenantSummary, UpdateTenantPayload, UserListQuery},
    },
};

/// Gestão de lojas e vínculo de vendedores. Tudo aqui é exclusivo de ADMIN.
#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn Store>,
}

impl TenantService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_tenants(
        &self,
        ctx: &TenantContext,
        pagination: &Pagination,
    ) -> Result<Vec<TenantSummary>, AppError> {
        ctx.require_admin()?;
        pagination.validate()?;

        let mut tx = self.store.begin().await?;
        let tenants = tx.list_tenants(pagination.limit, pagination.offset).await?;
        tx.commit().await?;
        Ok(tenants)
    }

    pub async fn create_tenant(
        &self,
        ctx: &TenantContext,
        payload: &CreateTenantPayload,
    ) -> Result<Tenant, AppError> {
        ctx.require_admin()?;
        payload.validate()?;

        let mut tx = self.store.begin().await?;
        let tenant = tx
            .insert_tenant(NewTenant {
                name: payload.name.trim().to_string(),
                address: normalize_optional(payload.address.as_deref()),
                contact: normalize_optional(payload.contact.as_deref()),
            })
            .await?;
        tx.commit().await?;

        tracing::info!(tenant_id = %tenant.id, name = %tenant.name, "🏬 Loja criada");
        Ok(tenant)
    }

    pub async fn update_tenant(
        &self,
        ctx: &TenantContext,
        id: &str,
        payload: &UpdateTenantPayload,
    ) -> Result<Tenant, AppError> {
        ctx.require_admin()?;
        payload.validate()?;

        // Campo ausente não muda nada; campo em branco limpa o valor
        let changes = TenantChanges {
            name: payload.name.as_deref().map(|n| n.trim().to_string()),
            address: payload.address.as_deref().map(|a| normalize_optional(Some(a))),
            contact: payload.contact.as_deref().map(|c| normalize_optional(Some(c))),
        };

        let mut tx = self.store.begin().await?;
        let tenant = tx
            .update_tenant(id, changes)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Loja"))?;
        tx.commit().await?;

        Ok(tenant)
    }

    pub async fn delete_tenant(&self, ctx: &TenantContext, id: &str) -> Result<(), AppError> {
        ctx.require_admin()?;

        let mut tx = self.store.begin().await?;
        if !tx.delete_tenant(id).await? {
            return Err(AppError::NotFoundOrDenied("Loja"));
        }
        tx.commit().await?;

        tracing::info!(tenant_id = %id, "Loja removida");
        Ok(())
    }

    pub async fn list_users(&self, ctx: &TenantContext, query: &UserListQuery) -> Result<Vec<User>, AppError> {
        ctx.require_admin()?;
        query.validate()?;

        let mut tx = self.store.begin().await?;
        let users = tx.list_users(query.role, query.limit, query.offset).await?;
        tx.commit().await?;
        Ok(users)
    }

    pub async fn list_tenant_users(&self, ctx: &TenantContext, tenant_id: &str) -> Result<Vec<User>, AppError> {
        ctx.require_admin()?;

        let mut tx = self.store.begin().await?;
        tx.find_tenant(tenant_id)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Loja"))?;
        let users = tx.list_tenant_users(tenant_id).await?;
        tx.commit().await?;
        Ok(users)
    }

    pub async fn assign_user_to_tenant(
        &self,
        ctx: &TenantContext,
        tenant_id: &str,
        user_id: i64,
    ) -> Result<User, AppError> {
        ctx.require_admin()?;

        let mut tx = self.store.begin().await?;
        tx.find_tenant(tenant_id)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Loja"))?;
        let user = tx
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Usuário"))?;
        // ADMIN nunca pertence a uma loja
        if user.role == Role::Admin {
            return Err(AppError::ValidationFailed(single_field_error(
                "userId",
                "role",
                "Administradores não podem ser vinculados a uma loja.",
            )));
        }
        let user = tx
            .set_user_tenant(user_id, Some(tenant_id))
            .await?
            .ok_or(AppError::NotFoundOrDenied("Usuário"))?;
        tx.commit().await?;

        tracing::info!(user_id, tenant_id = %tenant_id, "Vendedor vinculado à loja");
        Ok(user)
    }

    pub async fn remove_user_from_tenant(
        &self,
        ctx: &TenantContext,
        tenant_id: &str,
        user_id: i64,
    ) -> Result<User, AppError> {
        ctx.require_admin()?;

        let mut tx = self.store.begin().await?;
        let belongs = tx
            .find_user(user_id)
            .await?
            .is_some_and(|u| u.tenant_id.as_deref() == Some(tenant_id));
        if !belongs {
            return Err(AppError::NotFoundOrDenied("Usuário"));
        }
        let user = tx
            .set_user_tenant(user_id, None)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Usuário"))?;
        tx.commit().await?;

        tracing::info!(user_id, tenant_id = %tenant_id, "Vendedor desvinculado da loja");
        Ok(user)
    }
}
