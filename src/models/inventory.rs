// src/models/inventory.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::auth::UserSummary;

// --- Movimentações de Estoque ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,  // Entrada: soma ao estoque
    Out, // Saída: subtrai do estoque
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub variant_id: i64,
    pub quantity: i32,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    // Apenas metadado, não participa da lógica
    #[serde(default)]
    pub reason: String,
}

impl StockMovement {
    /// Variação líquida aplicada ao estoque (`+q` para IN, `-q` para OUT).
    pub fn delta(&self) -> i32 {
        match self.movement_type {
            MovementType::In => self.quantity,
            MovementType::Out => -self.quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStockUpdate {
    pub variant_id: i64,
    pub new_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransfer {
    pub from_variant_id: i64,
    pub to_variant_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub variant_id: i64,
    pub quantity: i32,
    pub reservation_id: String,
}

// --- Reserva de estoque (livro de reservas com expiração) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockReservation {
    pub id: i64,
    pub reservation_id: String,
    // Dono do carrinho: o mesmo id em outro usuário é outra reserva
    pub user_id: i64,
    pub variant_id: i64,
    pub tenant_id: String,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---
// Resultado uniforme das operações em lote
// ---
// Os erros são dados: o chamador sabe quais itens falharam, e que nada foi gravado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockIssue {
    #[serde(rename_all = "camelCase")]
    VariantNotFoundOrDenied { variant_id: i64 },
    #[serde(rename_all = "camelCase")]
    InsufficientStock {
        variant_id: i64,
        available: i32,
        requested: i32,
    },
    #[serde(rename_all = "camelCase")]
    InvalidQuantity { variant_id: i64, quantity: i32 },
    #[serde(rename_all = "camelCase")]
    InvalidStockValue { variant_id: i64, new_stock: i32 },
    #[serde(rename_all = "camelCase")]
    InvalidReservation { reservation_id: String },
    // Falha inesperada do armazenamento; detalhes ficam só no log
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTransactionResult {
    pub success: bool,
    pub affected_variant_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StockIssue>,
}

impl InventoryTransactionResult {
    pub fn committed(affected_variant_ids: Vec<i64>) -> Self {
        Self { success: true, affected_variant_ids, errors: Vec::new() }
    }

    pub fn rolled_back(errors: Vec<StockIssue>) -> Self {
        Self { success: false, affected_variant_ids: Vec::new(), errors }
    }
}

// --- Histórico (derivado dos itens de nota) ---
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementHistoryEntry {
    pub invoice_item_id: i64,
    pub invoice_id: i64,
    pub variant_id: i64,
    pub barcode: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub seller: UserSummary,
    pub created_at: DateTime<Utc>,
}
