// src/models/tenancy.rs

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use validator::Validate;

use crate::{common::validation::validate_not_blank, models::auth::Role};

// ---
// 1. Tenant (A "Loja")
// ---
// A unidade de isolamento dos dados: produtos, usuários e notas pertencem a ela.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. TenantSummary (Listagem administrativa)
// ---
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub tenant: Tenant,
    pub user_count: i64,
    pub product_count: i64,
    pub invoice_count: i64,
}

// ---
// Payloads
// ---
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantPayload {
    #[validate(
        length(max = 255, message = "O nome da loja não pode exceder 255 caracteres."),
        custom(function = "validate_not_blank")
    )]
    pub name: String,

    #[validate(length(max = 500, message = "O endereço não pode exceder 500 caracteres."))]
    pub address: Option<String>,

    #[validate(length(max = 255, message = "O contato não pode exceder 255 caracteres."))]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantPayload {
    #[validate(
        length(max = 255, message = "O nome da loja não pode exceder 255 caracteres."),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,

    #[validate(length(max = 500, message = "O endereço não pode exceder 500 caracteres."))]
    pub address: Option<String>,

    #[validate(length(max = 255, message = "O contato não pode exceder 255 caracteres."))]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignUserPayload {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Pagination {
    #[validate(range(min = 1, max = 100, message = "O limite deve estar entre 1 e 100."))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "O offset não pode ser negativo."))]
    #[serde(default)]
    pub offset: i64,
}

pub fn default_limit() -> i64 {
    50
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

// Listagem administrativa de usuários (para achar quem vincular a uma loja)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub role: Option<Role>,

    #[validate(range(min = 1, max = 200, message = "O limite deve estar entre 1 e 200."))]
    #[serde(default = "default_user_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "O offset não pode ser negativo."))]
    #[serde(default)]
    pub offset: i64,
}

fn default_user_limit() -> i64 {
    100
}

impl Default for UserListQuery {
    fn default() -> Self {
        Self { role: None, limit: default_user_limit(), offset: 0 }
    }
}
