// src/models/catalog.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::common::validation::{validate_barcode, validate_not_blank, validate_price, validate_weight};

// --- 1. Produtos ---
// O "catálogo": o estoque fica nas variantes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    // Imutável depois da criação
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 2. Variantes (SKU vendável) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: i64,
    // Único no sistema inteiro: um "bip" resolve sem ambiguidade
    pub barcode: String,
    pub weight: Decimal,
    pub price: Decimal,
    // Nunca negativo
    pub stock: i32,
    pub product_id: i64,
    // Cópia do tenant do produto (filtro sem JOIN)
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithVariants {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantWithProduct {
    #[serde(flatten)]
    pub variant: ProductVariant,
    pub product: Product,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_products: i64,
    pub total_variants: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub inventory_value: Decimal,
}

/// Limite de "estoque baixo" usado pelas estatísticas do catálogo.
pub const STATS_LOW_STOCK_BELOW: i32 = 10;

// ---
// Consultas
// ---
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub tenant_id: Option<String>,
    pub category: Option<String>,

    #[validate(range(min = 1, max = 100, message = "O limite deve estar entre 1 e 100."))]
    pub limit: Option<i64>,

    #[validate(range(min = 0, message = "O offset não pode ser negativo."))]
    pub offset: Option<i64>,
}

// ---
// Payloads
// ---
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductPayload {
    #[validate(
        length(max = 255, message = "O nome do produto não pode exceder 255 caracteres."),
        custom(function = "validate_not_blank")
    )]
    pub name: String,

    #[validate(length(max = 1000, message = "A descrição não pode exceder 1000 caracteres."))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "A categoria não pode exceder 100 caracteres."))]
    pub category: Option<String>,

    // Obrigatório para ADMIN; para SELLER vale sempre a própria loja
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductPayload {
    #[validate(
        length(max = 255, message = "O nome do produto não pode exceder 255 caracteres."),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "A descrição não pode exceder 1000 caracteres."))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "A categoria não pode exceder 100 caracteres."))]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantPayload {
    #[validate(custom(function = "validate_barcode"))]
    pub barcode: String,

    #[validate(custom(function = "validate_weight"))]
    pub weight: Decimal,

    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,

    #[validate(range(min = 0, message = "O estoque não pode ser negativo."))]
    #[serde(default)]
    pub stock: i32,

    pub tenant_id: Option<String>,
}

// O estoque nunca é alterado por aqui: só pelo motor de transações.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariantPayload {
    #[validate(custom(function = "validate_barcode"))]
    pub barcode: Option<String>,

    #[validate(custom(function = "validate_weight"))]
    pub weight: Option<Decimal>,

    #[validate(custom(function = "validate_price"))]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentPayload {
    pub stock_change: i32,
}
