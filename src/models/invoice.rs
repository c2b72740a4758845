// src/models/invoice.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    common::validation::{numeric_limit, validate_unit_price},
    models::{
        auth::UserSummary,
        catalog::{Product, ProductVariant},
        tenancy::Tenant,
    },
};

// --- Nota (imutável depois de criada) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    // Soma das linhas, calculada (nunca informada pelo cliente)
    pub total_amount: Decimal,
    pub user_id: i64,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    // Preço "congelado" no momento da venda
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    #[serde(flatten)]
    pub item: InvoiceItem,
    pub variant: ProductVariant,
    pub product: Product,
}

// A visão completa e já gravada de uma nota
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceLine>,
    pub user: UserSummary,
    pub tenant: Tenant,
}

// ---
// Payloads
// ---
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemInput {
    pub variant_id: i64,

    #[validate(range(min = 1, message = "A quantidade deve ser maior que zero."))]
    pub quantity: i32,

    #[validate(custom(function = "validate_unit_price"))]
    pub unit_price: Decimal,
}

impl InvoiceItemInput {
    /// `None` se a multiplicação estourar.
    pub fn total_price(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoicePayload {
    #[validate(length(min = 1, message = "A nota precisa de pelo menos um item."), nested)]
    pub items: Vec<InvoiceItemInput>,

    // Obrigatório para ADMIN; SELLER fatura sempre na própria loja
    pub tenant_id: Option<String>,

    // Reserva feita no carrinho: é consumida junto com a nota
    pub reservation_id: Option<String>,
}

impl CreateInvoicePayload {
    /// Soma das linhas. `None` quando o total não cabe em `total_amount` (NUMERIC(14, 2)).
    pub fn total_amount(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.total_price()?))
            .filter(|total| *total < numeric_limit(12))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceQuery {
    pub tenant_id: Option<String>,
    pub user_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    #[validate(range(min = 1, max = 100, message = "O limite deve estar entre 1 e 100."))]
    pub limit: Option<i64>,

    #[validate(range(min = 0, message = "O offset não pode ser negativo."))]
    pub offset: Option<i64>,
}
