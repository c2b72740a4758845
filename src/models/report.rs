// src/models/report.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Agrupamento temporal do relatório de vendas
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SalesPeriod {
    #[default]
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReportQuery {
    pub tenant_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_by: SalesPeriod,
}

// Uma linha por item de nota, já com a nota, a loja e o produto
#[derive(Debug, Clone, FromRow)]
pub struct SaleLine {
    pub invoice_id: i64,
    pub tenant_id: String,
    pub tenant_name: String,
    pub invoice_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub product_id: i64,
    pub product_name: String,
    pub category: Option<String>,
    pub quantity: i32,
    pub total_price: Decimal,
}

// ---
// Resposta
// ---

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_revenue: Decimal,
    pub total_invoices: i64,
    pub total_items: i64,
    pub total_quantity: i64,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSales {
    // YYYY-MM-DD (dia ou domingo da semana) ou YYYY-MM
    pub period: String,
    pub total_revenue: Decimal,
    pub total_invoices: i64,
    pub total_items: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: i64,
    pub product_name: String,
    pub category: Option<String>,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub invoice_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantSales {
    pub tenant_id: String,
    pub tenant_name: String,
    pub total_revenue: Decimal,
    pub total_invoices: i64,
    pub total_items: i64,
}

// Estoque atual por loja (não depende do período)
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantInventoryLevel {
    pub tenant_id: String,
    pub tenant_name: String,
    pub total_stock: i64,
    pub total_variants: i64,
    pub low_stock_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesReportFilters {
    pub tenant_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub group_by: SalesPeriod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub summary: SalesSummary,
    pub sales_by_period: Vec<PeriodSales>,
    pub top_products: Vec<ProductSales>,
    pub tenant_summary: Vec<TenantSales>,
    pub inventory_levels: Vec<TenantInventoryLevel>,
    pub filters: SalesReportFilters,
}
